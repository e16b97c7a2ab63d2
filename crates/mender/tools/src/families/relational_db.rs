use mender_types::{ParamSpec, ToolDescriptor, ToolParams};

use super::at_least;
use crate::family::{ToolDefaults, ToolFamily};

pub(super) fn catalog(defaults: &ToolDefaults) -> Vec<ToolDescriptor> {
    let family = ToolFamily::RelationalDb.as_str();
    vec![
        ToolDescriptor::new("postgres_restart", "Restart the database container", family).param(
            "container_name",
            ParamSpec::string("Database container name").with_default(defaults.db_container.as_str()),
        ),
        ToolDescriptor::new(
            "postgres_scale_connections",
            "Request a new max_connections value. Takes effect only after a restart; \
             prefer postgres_kill_long_queries for immediate connection pressure",
            family,
        )
        .param(
            "max_connections",
            ParamSpec::integer("Target connection limit").required(),
        ),
        ToolDescriptor::new("postgres_vacuum", "Run VACUUM to reclaim storage", family)
            .param("table_name", ParamSpec::string("Table to vacuum; whole database when omitted"))
            .param(
                "analyze",
                ParamSpec::boolean("Refresh planner statistics as well").with_default(true),
            ),
        ToolDescriptor::new(
            "postgres_kill_long_queries",
            "Terminate queries running longer than the given duration",
            family,
        )
        .param(
            "duration_seconds",
            ParamSpec::integer("Minimum query age in seconds").required(),
        ),
    ]
}

pub(super) fn check(tool: &str, params: &ToolParams) -> Result<(), String> {
    match tool {
        "postgres_scale_connections" => at_least(params, "max_connections", 1),
        "postgres_kill_long_queries" => at_least(params, "duration_seconds", 0),
        _ => Ok(()),
    }
}
