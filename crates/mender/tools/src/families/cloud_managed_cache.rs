use mender_types::{ParamSpec, ToolDescriptor, ToolParams};

use super::{at_least, non_empty, project_param};
use crate::family::{ToolDefaults, ToolFamily};

pub(super) fn catalog(defaults: &ToolDefaults) -> Vec<ToolDescriptor> {
    let family = ToolFamily::CloudManagedCache.as_str();
    let located = |descriptor: ToolDescriptor| {
        descriptor
            .param("instance_id", ParamSpec::string("Managed cache instance id").required())
            .param(
                "location",
                ParamSpec::string("Instance region").with_default(defaults.region.as_str()),
            )
    };

    vec![
        located(ToolDescriptor::new(
            "gcp_redis_flush",
            "Flush every key from a managed cache instance",
            family,
        ))
        .param("project_id", project_param(defaults)),
        located(ToolDescriptor::new(
            "gcp_redis_restart",
            "Fail over a managed cache instance to restart it",
            family,
        ))
        .param("project_id", project_param(defaults)),
        located(ToolDescriptor::new(
            "gcp_redis_scale_memory",
            "Resize a managed cache instance",
            family,
        ))
        .param(
            "memory_size_gb",
            ParamSpec::integer("New capacity in GB").required(),
        )
        .param("project_id", project_param(defaults)),
    ]
}

pub(super) fn check(tool: &str, params: &ToolParams) -> Result<(), String> {
    non_empty(params, "instance_id")?;
    match tool {
        "gcp_redis_scale_memory" => at_least(params, "memory_size_gb", 1),
        _ => Ok(()),
    }
}
