//! Per-caller conversation state
//!
//! The session is a plain value owned by the caller and lent `&mut` to
//! each `forward` call, so at most one invocation can touch it at a time.
//! Chat history is append-only within a session and only cleared by an
//! explicit reset.

use crate::pipeline::PipelineState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Speaker of a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRole::User => write!(f, "User"),
            ChatRole::Assistant => write!(f, "Assistant"),
        }
    }
}

/// One turn of chat history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub content: String,
    pub role: ChatRole,
}

/// Mutable state carried between invocations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    chat_history: Vec<ChatTurn>,

    /// Free-form working notes of the current invocation
    pub scratchpad: String,

    /// Whether the last invocation reached `Done`
    pub finished: bool,

    /// Formatted ranking produced by the last successful invocation
    pub answer: Vec<String>,

    /// Stage reached by the last invocation
    pub stage: PipelineState,
}

impl SessionState {
    /// Create an empty session
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset per-invocation fields; with `clear` also wipe chat history
    pub fn reset(&mut self, clear: bool) {
        self.scratchpad.clear();
        self.finished = false;
        self.answer.clear();
        self.stage = PipelineState::Idle;
        if clear {
            self.chat_history.clear();
        }
    }

    /// Append a chat turn
    pub fn add_turn(&mut self, content: impl Into<String>, role: ChatRole) {
        self.chat_history.push(ChatTurn {
            content: content.into(),
            role,
        });
    }

    /// All turns in insertion order
    pub fn chat_history(&self) -> &[ChatTurn] {
        &self.chat_history
    }

    /// Render history for prompt injection, one `Role: content` line per turn
    pub fn formatted_history(&self) -> String {
        if self.chat_history.is_empty() {
            return "No chat history.\n".to_string();
        }

        let lines: Vec<String> = self
            .chat_history
            .iter()
            .map(|turn| format!("{}: {}", turn.role, turn.content))
            .collect();
        format!("\n{}\n", lines.join("\n"))
    }

    /// Mark the invocation finished with its answer
    pub fn finish(&mut self, answer: Vec<String>) {
        self.answer = answer;
        self.finished = true;
    }
}
