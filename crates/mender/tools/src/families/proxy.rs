use mender_types::{ParamSpec, ToolDescriptor, ToolParams};

use super::at_least;
use crate::family::{ToolDefaults, ToolFamily};

pub(super) fn catalog(defaults: &ToolDefaults) -> Vec<ToolDescriptor> {
    let family = ToolFamily::Proxy.as_str();
    let container = || {
        ParamSpec::string("Proxy container name").with_default(defaults.proxy_container.as_str())
    };

    vec![
        ToolDescriptor::new("nginx_restart", "Restart the proxy container", family)
            .param("container_name", container()),
        ToolDescriptor::new(
            "nginx_reload",
            "Reload proxy configuration without dropping connections",
            family,
        )
        .param("container_name", container()),
        ToolDescriptor::new(
            "nginx_clear_connections",
            "Drop idle and stuck client connections",
            family,
        )
        .param("container_name", container()),
        ToolDescriptor::new("nginx_info", "Read proxy status and connection counters", family)
            .param("container_name", container()),
        ToolDescriptor::new(
            "nginx_scale_connections",
            "Change the worker connection limit",
            family,
        )
        .param(
            "worker_connections",
            ParamSpec::integer("New worker_connections value").required(),
        ),
    ]
}

pub(super) fn check(tool: &str, params: &ToolParams) -> Result<(), String> {
    match tool {
        "nginx_scale_connections" => at_least(params, "worker_connections", 1),
        _ => Ok(()),
    }
}
