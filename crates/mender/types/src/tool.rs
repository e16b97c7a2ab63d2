//! Tool descriptors and tool results

use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Tool parameters as passed by a plan step.
pub type ToolParams = serde_json::Map<String, Value>;

/// JSON type of a declared tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamType {
    /// Whether `value` has this type. Integral floats count as integers.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false)
            }
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::String => write!(f, "string"),
            ParamType::Integer => write!(f, "integer"),
            ParamType::Number => write!(f, "number"),
            ParamType::Boolean => write!(f, "boolean"),
        }
    }
}

/// Declaration of one tool parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamSpec {
    fn new(param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            param_type,
            description: description.into(),
            required: false,
            default: None,
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::new(ParamType::String, description)
    }

    pub fn integer(description: impl Into<String>) -> Self {
        Self::new(ParamType::Integer, description)
    }

    pub fn number(description: impl Into<String>) -> Self {
        Self::new(ParamType::Number, description)
    }

    pub fn boolean(description: impl Into<String>) -> Self {
        Self::new(ParamType::Boolean, description)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Name, description and parameter schema of one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,

    /// Resource family the tool operates on.
    pub resource_type: String,

    #[serde(default)]
    pub parameters: BTreeMap<String, ParamSpec>,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            resource_type: resource_type.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.parameters.insert(name.into(), spec);
        self
    }

    /// Names of parameters that must be present.
    pub fn required_params(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
    }

    /// Required parameters absent from `params`.
    pub fn missing_required(&self, params: &ToolParams) -> Vec<String> {
        self.required_params()
            .filter(|name| params.get(*name).map_or(true, Value::is_null))
            .map(str::to_string)
            .collect()
    }
}

/// Outcome of executing one plan step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    pub timestamp: DateTime<Utc>,
}

impl ToolResult {
    pub fn success(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            message: message.into(),
            metadata: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            message: message.into(),
            metadata: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_error(mut self, kind: ErrorKind) -> Self {
        self.error = Some(kind);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new("docker_scale", "Scale a service", "container")
            .param("service_name", ParamSpec::string("Service").required())
            .param("replicas", ParamSpec::integer("Replica count").required())
            .param("detach", ParamSpec::boolean("Run detached"))
    }

    #[test]
    fn test_param_type_accepts() {
        assert!(ParamType::Integer.accepts(&json!(3)));
        assert!(ParamType::Integer.accepts(&json!(3.0)));
        assert!(!ParamType::Integer.accepts(&json!(3.5)));
        assert!(!ParamType::Integer.accepts(&json!("3")));
        assert!(ParamType::Number.accepts(&json!(0.5)));
        assert!(ParamType::String.accepts(&json!("redis")));
        assert!(ParamType::Boolean.accepts(&json!(false)));
    }

    #[test]
    fn test_missing_required() {
        let mut params = ToolParams::new();
        params.insert("service_name".to_string(), json!("web"));
        params.insert("replicas".to_string(), Value::Null);

        assert_eq!(descriptor().missing_required(&params), vec!["replicas".to_string()]);
    }

    #[test]
    fn test_descriptor_schema_shape() {
        let value = serde_json::to_value(descriptor()).unwrap();
        assert_eq!(value["parameters"]["replicas"]["type"], "integer");
        assert_eq!(value["parameters"]["replicas"]["required"], true);
        assert_eq!(value["parameters"]["detach"]["required"], false);
    }
}
