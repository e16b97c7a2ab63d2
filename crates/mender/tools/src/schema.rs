//! Parameter validation against a tool's declared schema.

use mender_types::{ToolDescriptor, ToolParams};
use serde_json::Value;
use tracing::warn;

use crate::error::{ToolCallResult, ToolError};

/// Validate `params` against `descriptor` and return the arguments to invoke with.
///
/// Missing required parameters and type mismatches are rejected. Declared
/// defaults fill absent optional parameters, nulls count as absent, and
/// parameters the schema does not declare are stripped.
pub fn prepare(descriptor: &ToolDescriptor, params: &ToolParams) -> ToolCallResult<ToolParams> {
    let missing = descriptor.missing_required(params);
    if !missing.is_empty() {
        return Err(ToolError::invalid(
            &descriptor.name,
            format!("missing required parameter(s): {}", missing.join(", ")),
        ));
    }

    let mut prepared = ToolParams::new();
    for (name, spec) in &descriptor.parameters {
        match params.get(name).filter(|v| !v.is_null()) {
            Some(value) => {
                if !spec.param_type.accepts(value) {
                    return Err(ToolError::invalid(
                        &descriptor.name,
                        format!(
                            "parameter '{}' must be {}, got {}",
                            name,
                            spec.param_type,
                            type_name(value)
                        ),
                    ));
                }
                prepared.insert(name.clone(), value.clone());
            }
            None => {
                if let Some(default) = &spec.default {
                    prepared.insert(name.clone(), default.clone());
                }
            }
        }
    }

    let unknown: Vec<&str> = params
        .keys()
        .filter(|k| !descriptor.parameters.contains_key(*k))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        warn!(tool = %descriptor.name, params = ?unknown, "Stripping undeclared parameters");
    }

    Ok(prepared)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
