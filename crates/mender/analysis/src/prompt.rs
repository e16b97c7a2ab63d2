//! Request text for the analysis provider.
//!
//! The prompt embeds, in order: application configuration, resource
//! summary (unhealthy first), error logs (those tied to unhealthy resources
//! first), the tool catalog, feedback from a previous attempt, and the task
//! with the expected JSON shape.

use std::fmt::Write;

use mender_types::{FailureContext, LogEntry, ResourceStatus, ToolDescriptor};

/// Logs tied to unhealthy resources kept in the prompt.
pub const PRIORITY_LOG_LIMIT: usize = 15;

/// Other error logs kept in the prompt.
pub const OTHER_LOG_LIMIT: usize = 10;

pub const SYSTEM_PROMPT: &str = "You are an infrastructure remediation agent. \
You diagnose failures from resource metrics and logs and answer with a fix plan \
that only uses the tools you are given. Reply with a single JSON object and nothing else.";

const RESPONSE_SCHEMA: &str = r#"{
  "root_cause": "Brief description of the root cause",
  "reasoning": "Why this is the issue and why these steps fix it",
  "steps": [
    {
      "tool_name": "name_of_tool",
      "parameters": {"param": "value"},
      "description": "What this step does"
    }
  ],
  "tools_to_use": ["tool_a", "tool_b"]
}"#;

/// Sent after a reply that could not be parsed.
pub const REASK_SUFFIX: &str = "\n\nYour previous reply could not be parsed. \
Respond with only the JSON object in the format above, without prose or code fences.";

/// Build the analysis request text.
pub fn build(context: &FailureContext, tools: &[ToolDescriptor]) -> String {
    let mut out = String::new();

    out.push_str("Analyze the following infrastructure failure and create a fix plan.\n\n");

    out.push_str("## Application Configuration\n");
    let application = if context.application.is_null() {
        "{}".to_string()
    } else {
        serde_json::to_string_pretty(&context.application).unwrap_or_else(|_| "{}".to_string())
    };
    out.push_str(&application);
    out.push_str("\n\n");

    out.push_str("## Current Resource Status\n");
    out.push_str(&resource_section(&context.resources));
    out.push('\n');

    out.push_str("## Error Logs\n");
    out.push_str(&log_section(&context.resources, &context.logs));
    out.push('\n');

    out.push_str("## Available Tools\n");
    out.push_str(&tool_section(tools));
    out.push('\n');

    if let Some(previous) = &context.previous_attempt {
        out.push_str("## Previous Attempt (Did Not Resolve Issue)\n");
        let tools_used = if previous.tools_used.is_empty() {
            "None".to_string()
        } else {
            previous.tools_used.join(", ")
        };
        let failed = if previous.failed_resources.is_empty() {
            "None".to_string()
        } else {
            previous
                .failed_resources
                .iter()
                .map(|f| format!("{} ({})", f.name, f.reason))
                .collect::<Vec<_>>()
                .join("; ")
        };
        let _ = writeln!(out, "- Attempt: {}", previous.attempt_number);
        let _ = writeln!(out, "- Tools used: {}", tools_used);
        let _ = writeln!(out, "- Still failing: {}", failed);
        let _ = writeln!(out, "- Message: {}", previous.message);
        out.push_str("The resource status above was captured after that attempt. ");
        out.push_str("Explain why it did not work and choose a different tool or approach.\n\n");
    }

    out.push_str("## Task\n");
    out.push_str("1. Focus on DEGRADED and FAILED resources. Every one of them needs at least one fix step.\n");
    out.push_str("2. Identify the root cause from the resource status and the logs.\n");
    out.push_str("3. Only use tools listed above, with parameters matching their schema.\n");
    out.push_str("4. Prefer tools that take effect immediately over ones that need a manual follow-up.\n");
    out.push_str("5. Respond with JSON in exactly this format:\n");
    out.push_str(RESPONSE_SCHEMA);
    out.push('\n');

    out
}

fn resource_section(resources: &[ResourceStatus]) -> String {
    let mut out = String::new();
    let unhealthy: Vec<&ResourceStatus> = resources.iter().filter(|r| r.is_unhealthy()).collect();
    let rest: Vec<&ResourceStatus> = resources.iter().filter(|r| !r.is_unhealthy()).collect();

    if unhealthy.is_empty() {
        out.push_str("No resource is currently DEGRADED or FAILED.\n");
    } else {
        out.push_str("DEGRADED/FAILED resources (must fix):\n");
        for r in unhealthy {
            let _ = writeln!(
                out,
                "  - {} [{}] {} ({}): {}",
                r.name,
                r.id,
                r.kind,
                r.status,
                r.metrics_summary()
            );
        }
    }

    if !rest.is_empty() {
        out.push_str("Other resources:\n");
        for r in rest {
            match &r.error {
                Some(error) => {
                    let _ = writeln!(out, "  - {} [{}] {} ({}): {}", r.name, r.id, r.kind, r.status, error);
                }
                None => {
                    let _ = writeln!(out, "  - {} [{}] {} ({})", r.name, r.id, r.kind, r.status);
                }
            }
        }
    }
    out
}

fn log_section(resources: &[ResourceStatus], logs: &[LogEntry]) -> String {
    let unhealthy: Vec<&ResourceStatus> = resources.iter().filter(|r| r.is_unhealthy()).collect();
    let (priority, other): (Vec<&LogEntry>, Vec<&LogEntry>) = logs
        .iter()
        .filter(|l| l.severity.is_error_level())
        .partition(|l| unhealthy.iter().any(|r| mentions(l, r)));

    if priority.is_empty() && other.is_empty() {
        return "No error-level logs in the window.\n".to_string();
    }

    let mut out = String::new();
    if !priority.is_empty() {
        out.push_str("Logs from DEGRADED/FAILED resources (high priority):\n");
        for entry in tail(&priority, PRIORITY_LOG_LIMIT) {
            out.push_str(&format_log(entry));
        }
    }
    if !other.is_empty() {
        out.push_str("Other logs (lower priority):\n");
        for entry in tail(&other, OTHER_LOG_LIMIT) {
            out.push_str(&format_log(entry));
        }
    }
    out
}

fn mentions(entry: &LogEntry, resource: &ResourceStatus) -> bool {
    if entry.resource_id == resource.id {
        return true;
    }
    let message = entry.message.to_lowercase();
    message.contains(&resource.name.to_lowercase())
}

fn tail<'a>(entries: &'a [&'a LogEntry], limit: usize) -> &'a [&'a LogEntry] {
    &entries[entries.len().saturating_sub(limit)..]
}

fn format_log(entry: &LogEntry) -> String {
    format!(
        "[{}] {} {}: {}\n",
        entry.timestamp.to_rfc3339(),
        entry.severity,
        entry.resource_id,
        entry.message
    )
}

fn tool_section(tools: &[ToolDescriptor]) -> String {
    let mut out = String::new();
    for tool in tools {
        let params = serde_json::to_string(&tool.parameters).unwrap_or_else(|_| "{}".to_string());
        let _ = writeln!(out, "- {} [{}]: {}", tool.name, tool.resource_type, tool.description);
        let _ = writeln!(out, "  Parameters: {}", params);
    }
    out
}
