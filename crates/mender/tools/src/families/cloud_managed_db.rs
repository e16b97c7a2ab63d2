use mender_types::{ParamSpec, ToolDescriptor, ToolParams};

use super::{at_least, non_empty, project_param};
use crate::family::{ToolDefaults, ToolFamily};

pub(super) fn catalog(defaults: &ToolDefaults) -> Vec<ToolDescriptor> {
    let family = ToolFamily::CloudManagedDb.as_str();
    let instance = || ParamSpec::string("Managed database instance id").required();

    vec![
        ToolDescriptor::new(
            "gcp_sql_restart_instance",
            "Restart a managed database instance",
            family,
        )
        .param("instance_id", instance())
        .param("project_id", project_param(defaults)),
        ToolDescriptor::new(
            "gcp_sql_scale_tier",
            "Move a managed database instance to another machine tier",
            family,
        )
        .param("instance_id", instance())
        .param("tier", ParamSpec::string("Target tier such as db-custom-2-7680").required())
        .param("project_id", project_param(defaults)),
        ToolDescriptor::new(
            "gcp_sql_kill_connections",
            "Terminate long-running sessions on a managed database",
            family,
        )
        .param("instance_id", instance())
        .param("database_name", ParamSpec::string("Database name").required())
        .param(
            "duration_seconds",
            ParamSpec::integer("Minimum session age in seconds").with_default(5),
        )
        .param("project_id", project_param(defaults)),
    ]
}

pub(super) fn check(tool: &str, params: &ToolParams) -> Result<(), String> {
    non_empty(params, "instance_id")?;
    match tool {
        "gcp_sql_scale_tier" => non_empty(params, "tier"),
        "gcp_sql_kill_connections" => {
            non_empty(params, "database_name")?;
            at_least(params, "duration_seconds", 0)
        }
        _ => Ok(()),
    }
}
