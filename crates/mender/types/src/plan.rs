//! Remediation plans

use crate::tool::ToolParams;
use serde::{Deserialize, Serialize};

/// One ordered step of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixStep {
    pub tool_name: String,
    #[serde(default)]
    pub parameters: ToolParams,
    #[serde(default)]
    pub description: String,
}

impl FixStep {
    pub fn new(tool_name: impl Into<String>, parameters: ToolParams) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Root cause, rationale and ordered steps proposed by the analysis provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixPlan {
    #[serde(default)]
    pub root_cause: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub steps: Vec<FixStep>,
}

impl FixPlan {
    pub fn new(root_cause: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            root_cause: root_cause.into(),
            reasoning: reasoning.into(),
            steps: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: FixStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Tool names in step order.
    pub fn tool_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.tool_name.clone()).collect()
    }
}
