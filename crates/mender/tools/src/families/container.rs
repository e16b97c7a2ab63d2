use mender_types::{ParamSpec, ToolDescriptor, ToolParams};

use super::{at_least, non_empty};
use crate::family::ToolFamily;

pub(super) fn catalog() -> Vec<ToolDescriptor> {
    let family = ToolFamily::Container.as_str();
    let container = || ParamSpec::string("Container name").required();

    vec![
        ToolDescriptor::new("docker_restart", "Restart a container", family)
            .param("container_name", container()),
        ToolDescriptor::new("docker_scale", "Scale a compose service to N replicas", family)
            .param("service_name", ParamSpec::string("Service name").required())
            .param("replicas", ParamSpec::integer("Desired replica count").required()),
        ToolDescriptor::new("docker_logs", "Fetch recent container logs", family)
            .param("container_name", container())
            .param("tail", ParamSpec::integer("Number of lines").with_default(100)),
        ToolDescriptor::new("docker_stats", "Read container CPU and memory usage", family)
            .param("container_name", container()),
    ]
}

pub(super) fn check(tool: &str, params: &ToolParams) -> Result<(), String> {
    match tool {
        "docker_scale" => {
            non_empty(params, "service_name")?;
            at_least(params, "replicas", 0)
        }
        "docker_logs" => {
            non_empty(params, "container_name")?;
            at_least(params, "tail", 1)
        }
        _ => non_empty(params, "container_name"),
    }
}
