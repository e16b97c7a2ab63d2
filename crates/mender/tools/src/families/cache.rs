use mender_types::{ParamSpec, ToolDescriptor, ToolParams};

use super::{at_least, non_empty};
use crate::family::{ToolDefaults, ToolFamily};

pub(super) fn catalog(defaults: &ToolDefaults) -> Vec<ToolDescriptor> {
    let family = ToolFamily::Cache.as_str();
    vec![
        ToolDescriptor::new("redis_flush", "Flush every key from a cache database", family)
            .param("db", ParamSpec::integer("Database index to flush").with_default(0)),
        ToolDescriptor::new("redis_restart", "Restart the cache container", family).param(
            "container_name",
            ParamSpec::string("Cache container name").with_default(defaults.cache_container.as_str()),
        ),
        ToolDescriptor::new(
            "redis_memory_purge",
            "Reclaim cache memory by evicting keys under an LRU policy",
            family,
        )
        .param(
            "maxmemory",
            ParamSpec::string("New memory ceiling such as 256mb; current limit kept when omitted"),
        ),
        ToolDescriptor::new("redis_info", "Read cache server information and statistics", family)
            .param(
                "section",
                ParamSpec::string("INFO section: memory, stats, clients or all").with_default("all"),
            ),
    ]
}

pub(super) fn check(tool: &str, params: &ToolParams) -> Result<(), String> {
    match tool {
        "redis_flush" => at_least(params, "db", 0),
        "redis_memory_purge" => non_empty(params, "maxmemory"),
        _ => Ok(()),
    }
}
