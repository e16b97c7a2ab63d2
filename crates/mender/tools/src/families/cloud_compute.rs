use mender_types::{ParamSpec, ToolDescriptor, ToolParams};

use super::{non_empty, project_param};
use crate::family::{ToolDefaults, ToolFamily};

pub(super) fn catalog(defaults: &ToolDefaults) -> Vec<ToolDescriptor> {
    let family = ToolFamily::CloudCompute.as_str();
    let lifecycle = |name: &str, description: &str| {
        with_location(
            ToolDescriptor::new(name, description, family)
                .param("instance_name", ParamSpec::string("Compute instance name").required()),
            defaults,
        )
    };

    vec![
        lifecycle("gcp_compute_restart_instance", "Reset a compute instance"),
        lifecycle("gcp_compute_start_instance", "Start a stopped compute instance"),
        lifecycle("gcp_compute_stop_instance", "Stop a running compute instance"),
        with_location(
            ToolDescriptor::new(
                "gcp_compute_scale_instance",
                "Change an instance's machine type; the instance is stopped and restarted",
                family,
            )
            .param("instance_name", ParamSpec::string("Compute instance name").required())
            .param(
                "machine_type",
                ParamSpec::string("Target machine type such as e2-standard-4").required(),
            ),
            defaults,
        ),
    ]
}

fn with_location(descriptor: ToolDescriptor, defaults: &ToolDefaults) -> ToolDescriptor {
    descriptor
        .param("zone", ParamSpec::string("Compute zone").with_default(defaults.zone.as_str()))
        .param("project_id", project_param(defaults))
}

pub(super) fn check(tool: &str, params: &ToolParams) -> Result<(), String> {
    non_empty(params, "instance_name")?;
    match tool {
        "gcp_compute_scale_instance" => non_empty(params, "machine_type"),
        _ => Ok(()),
    }
}
