//! Prompt templates keyed by slot name
//!
//! Templates use `{name}` placeholders. `{{` and `}}` are literal braces,
//! and a brace that does not open an identifier placeholder is copied
//! through, so JSON examples can be written verbatim. A placeholder with
//! no matching argument is a configuration error.

use std::collections::BTreeMap;
use std::path::Path;

use crate::agents::AgentRole;
use crate::errors::{RecError, Result};

/// Slots rendered first, in this order; the rest follow alphabetically
pub const SLOT_ORDER: [&str; 4] = ["system", "instruction", "examples", "output_format"];

/// Named arguments for template rendering
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptArgs {
    values: BTreeMap<String, String>,
}

impl PromptArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// Immutable set of templates for one agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplates {
    slots: BTreeMap<String, String>,
}

impl PromptTemplates {
    pub fn new(slots: BTreeMap<String, String>) -> Self {
        Self { slots }
    }

    /// Read a JSON object of `slot → template`
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RecError::Config(format!("Failed to read prompts {}: {}", path.display(), e))
        })?;
        let slots: BTreeMap<String, String> = serde_json::from_str(&contents).map_err(|e| {
            RecError::Config(format!("Failed to parse prompts {}: {}", path.display(), e))
        })?;
        Ok(Self::new(slots))
    }

    /// Built-in templates for `role`
    pub fn defaults(role: AgentRole) -> Self {
        let pairs: &[(&str, &str)] = match role {
            AgentRole::ProjectAnalyst => &[
                (
                    "instruction",
                    "你是一名政府采购项目分析专家。请阅读下面的采购项目，概括项目所属领域、\
                     核心技术内容以及评审专家需要具备的专业背景。\n\
                     历史对话：{history}\n\
                     项目名称：{project_name}\n\
                     项目内容：{project_infos}",
                ),
                (
                    "output_format",
                    "请用一段简洁的中文输出项目分析，不要编造项目中没有的信息。",
                ),
            ],
            AgentRole::ExpertAnalyst => &[
                (
                    "instruction",
                    "你是一名专家画像分析师。请根据专家参与过的评审项目，总结其研究方向与评审专长。\n\
                     专家姓名：{expert_name}\n\
                     专业：{specialty}\n\
                     参与项目：\n{projects}",
                ),
                (
                    "output_format",
                    "请输出一段不超过200字的中文专家描述。",
                ),
            ],
            AgentRole::Recommender => &[
                (
                    "instruction",
                    "你是一名评审专家推荐助手。根据项目分析，从候选专家中挑选最合适的评审专家并排序。\
                     只能从候选专家中选择，不得虚构专家。\n\
                     项目分析：{project}\n\
                     候选专家：{experts}",
                ),
                (
                    "output_format",
                    "请严格按照如下JSON格式输出，不要输出其他内容：\n\
                     {\"sorted_experts\": [{\"rank\": 1, \"name\": \"专家姓名\", \"specialist\": \"专业\"}]}",
                ),
            ],
            AgentRole::Explainer => &[
                (
                    "instruction",
                    "你是一名推荐解释助手。请结合项目分析与专家描述，逐一说明每位专家被推荐的理由。\n\
                     项目分析：{project}\n\
                     推荐专家：{experts}",
                ),
                (
                    "output_format",
                    "请按排名顺序逐条输出推荐理由。",
                ),
            ],
        };

        Self::new(
            pairs
                .iter()
                .map(|(slot, text)| (slot.to_string(), text.to_string()))
                .collect(),
        )
    }

    /// Replace slots with any present in `overrides`
    pub fn merged(mut self, overrides: PromptTemplates) -> Self {
        self.slots.extend(overrides.slots);
        self
    }

    pub fn slot(&self, name: &str) -> Option<&str> {
        self.slots.get(name).map(String::as_str)
    }

    /// Slot names in assembly order
    pub fn ordered_slots(&self) -> Vec<&str> {
        let mut ordered: Vec<&str> = SLOT_ORDER
            .iter()
            .copied()
            .filter(|slot| self.slots.contains_key(*slot))
            .collect();
        ordered.extend(
            self.slots
                .keys()
                .map(String::as_str)
                .filter(|slot| !SLOT_ORDER.contains(slot)),
        );
        ordered
    }

    /// Render every slot and join them with blank lines
    pub fn render(&self, args: &PromptArgs) -> Result<String> {
        let rendered = self
            .ordered_slots()
            .into_iter()
            .map(|slot| render_template(&self.slots[slot], args))
            .collect::<Result<Vec<_>>>()?;
        Ok(rendered.join("\n\n"))
    }
}

/// Fill `{name}` placeholders in one template
pub fn render_template(template: &str, args: &PromptArgs) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(|c| c == '{' || c == '}') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
            continue;
        }
        if let Some(name) = placeholder_at(tail) {
            let value = args.get(name).ok_or_else(|| {
                RecError::Config(format!("Prompt argument '{}' was not supplied", name))
            })?;
            out.push_str(value);
            rest = &tail[name.len() + 2..];
            continue;
        }

        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }

    out.push_str(rest);
    Ok(out)
}

fn placeholder_at(tail: &str) -> Option<&str> {
    let body = tail.strip_prefix('{')?;
    let name = &body[..body.find('}')?];
    let valid = name
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some(name)
}
