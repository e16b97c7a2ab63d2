//! Validating parser for provider replies.
//!
//! A reply is located as JSON in this order: the whole text, the first
//! ```json fenced block, the first ``` fenced block, the first balanced
//! `{...}` object. Steps naming unknown tools or missing required
//! parameters are dropped individually; the rest of the plan survives.

use std::collections::HashMap;

use mender_types::{DroppedStep, FixPlan, FixStep, ToolDescriptor, ToolParams};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Outcome of parsing one reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseResult {
    /// A plan was recovered. `dropped` lists the steps that failed validation.
    Valid {
        plan: FixPlan,
        dropped: Vec<DroppedStep>,
    },
    /// No plan could be recovered from the raw text.
    Malformed(String),
}

impl ParseResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ParseResult::Valid { .. })
    }
}

#[derive(Debug, Deserialize)]
struct ReplyEnvelope {
    #[serde(default)]
    root_cause: Option<Value>,
    #[serde(default)]
    reasoning: Option<Value>,
    #[serde(default)]
    steps: Option<Vec<Value>>,
}

/// Parse `raw` into a plan whose steps all reference tools in `catalog`.
pub fn parse_reply(raw: &str, catalog: &[ToolDescriptor]) -> ParseResult {
    let Some(envelope) = candidates(raw)
        .into_iter()
        .find_map(|candidate| serde_json::from_str::<ReplyEnvelope>(&candidate).ok())
    else {
        return ParseResult::Malformed(raw.to_string());
    };

    if envelope.root_cause.is_none() && envelope.steps.is_none() {
        return ParseResult::Malformed(raw.to_string());
    }

    let tools: HashMap<&str, &ToolDescriptor> =
        catalog.iter().map(|t| (t.name.as_str(), t)).collect();

    let mut plan = FixPlan::new(
        text(envelope.root_cause.as_ref()),
        text(envelope.reasoning.as_ref()),
    );
    let mut dropped = Vec::new();

    for (index, value) in envelope.steps.unwrap_or_default().into_iter().enumerate() {
        match validate_step(value, &tools) {
            Ok(step) => plan.steps.push(step),
            Err(step) => {
                warn!(
                    step = index + 1,
                    tool = %step.tool_name,
                    reason = %step.reason,
                    "Dropping plan step"
                );
                dropped.push(step);
            }
        }
    }

    ParseResult::Valid { plan, dropped }
}

fn validate_step(
    value: Value,
    tools: &HashMap<&str, &ToolDescriptor>,
) -> Result<FixStep, DroppedStep> {
    let Value::Object(mut object) = value else {
        return Err(DroppedStep {
            tool_name: String::new(),
            reason: "step is not an object".to_string(),
        });
    };

    let tool_name = match object.remove("tool_name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
        _ => {
            return Err(DroppedStep {
                tool_name: String::new(),
                reason: "step has no tool_name".to_string(),
            })
        }
    };

    let Some(descriptor) = tools.get(tool_name.as_str()) else {
        return Err(DroppedStep {
            reason: format!("unknown tool '{}'", tool_name),
            tool_name,
        });
    };

    let parameters: ToolParams = match object.remove("parameters") {
        Some(Value::Object(params)) => params,
        None | Some(Value::Null) => ToolParams::new(),
        Some(_) => {
            return Err(DroppedStep {
                tool_name,
                reason: "parameters is not an object".to_string(),
            })
        }
    };

    let missing = descriptor.missing_required(&parameters);
    if !missing.is_empty() {
        return Err(DroppedStep {
            reason: format!("missing required parameter(s): {}", missing.join(", ")),
            tool_name,
        });
    }

    let description = match object.remove("description") {
        Some(Value::String(d)) => d,
        _ => String::new(),
    };

    Ok(FixStep::new(tool_name, parameters).with_description(description))
}

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// JSON candidates in the order they are tried.
fn candidates(raw: &str) -> Vec<String> {
    let mut out = vec![raw.trim().to_string()];
    if let Some(block) = fenced_block(raw, "```json") {
        out.push(block);
    }
    if let Some(block) = fenced_block(raw, "```") {
        out.push(block);
    }
    if let Some(object) = extract_first_json_object(raw) {
        out.push(object);
    }
    out
}

fn fenced_block(raw: &str, opening: &str) -> Option<String> {
    let start = raw.find(opening)? + opening.len();
    let rest = &raw[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_string())
}

fn extract_first_json_object(raw: &str) -> Option<String> {
    let start = raw.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(raw[start..start + idx + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}
