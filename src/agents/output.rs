//! Structured agent output: JSON extraction and ranking validation

use serde_json::Value;
use tracing::warn;

use crate::errors::{RecError, Result};
use crate::types::{CandidateExpert, RankedExpert};

/// Keys every `sorted_experts` element must carry
pub const REQUIRED_RANK_KEYS: [&str; 3] = ["rank", "name", "specialist"];

/// Locate the first complete top-level JSON object in `text`
///
/// Braces inside string literals (including escaped quotes) are ignored,
/// so model output wrapped in prose or code fences still parses.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut start: Option<usize> = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, byte) in text.bytes().enumerate() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if in_string {
            match byte {
                b'\\' => escape_next = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match byte {
            b'"' if start.is_some() => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| &text[s..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse the JSON object embedded in an agent's raw output
pub fn parse_json_object(text: &str) -> Result<Value> {
    let json = extract_json_object(text).ok_or_else(|| {
        RecError::MalformedAgentOutput(format!("No JSON object in output: {}", preview(text)))
    })?;
    serde_json::from_str(json)
        .map_err(|e| RecError::MalformedAgentOutput(format!("Invalid JSON: {}", e)))
}

/// Validate a Recommender answer and read its `sorted_experts`
///
/// Any element lacking a required key fails the whole answer.
pub fn parse_ranking(value: &Value) -> Result<Vec<RankedExpert>> {
    let entries = value
        .get("sorted_experts")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            RecError::MalformedAgentOutput("Missing 'sorted_experts' array".to_string())
        })?;

    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let object = entry.as_object().ok_or_else(|| {
                RecError::MalformedAgentOutput(format!("sorted_experts[{}] is not an object", i))
            })?;
            if let Some(key) = REQUIRED_RANK_KEYS.iter().find(|k| !object.contains_key(**k)) {
                return Err(RecError::MalformedAgentOutput(format!(
                    "sorted_experts[{}] is missing '{}'",
                    i, key
                )));
            }

            let rank = object["rank"]
                .as_u64()
                .and_then(|r| u32::try_from(r).ok())
                .filter(|r| *r >= 1)
                .ok_or_else(|| {
                    RecError::MalformedAgentOutput(format!(
                        "sorted_experts[{}].rank is not a positive integer",
                        i
                    ))
                })?;

            Ok(RankedExpert {
                rank,
                name: string_field(object, "name", i)?,
                specialist: string_field(object, "specialist", i)?,
                description: None,
            })
        })
        .collect()
}

fn string_field(object: &serde_json::Map<String, Value>, key: &str, i: usize) -> Result<String> {
    object[key].as_str().map(str::to_string).ok_or_else(|| {
        RecError::MalformedAgentOutput(format!("sorted_experts[{}].{} is not a string", i, key))
    })
}

/// Display lines for the first `num` entries, clamped to what is available
pub fn format_ranking(ranked: &[RankedExpert], num: usize) -> Vec<String> {
    ranked
        .iter()
        .take(num)
        .map(RankedExpert::display_line)
        .collect()
}

/// Copy the first `num` ranked experts and fill in candidate descriptions
///
/// Joined on name. When several candidates share a name the one recalled
/// first (highest similarity) wins.
pub fn attach_descriptions(
    ranked: &[RankedExpert],
    candidates: &[CandidateExpert],
    num: usize,
) -> Vec<RankedExpert> {
    ranked
        .iter()
        .take(num)
        .map(|expert| {
            let mut matches = candidates.iter().filter(|c| c.name == expert.name);
            let description = matches.next().map(|c| c.description.clone());
            if description.is_none() {
                warn!(name = %expert.name, "ranked expert is not among the recalled candidates");
            } else if matches.next().is_some() {
                warn!(name = %expert.name, "several candidates share this name, using the closest");
            }

            RankedExpert {
                description,
                ..expert.clone()
            }
        })
        .collect()
}

fn preview(text: &str) -> String {
    text.chars().take(80).collect()
}
