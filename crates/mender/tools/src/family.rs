//! Resource families and shared tool defaults.

use std::fmt;

use mender_types::ResourceKind;
use serde::{Deserialize, Serialize};

/// Resource family a tool adapter operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolFamily {
    Cache,
    RelationalDb,
    Proxy,
    Container,
    CloudCompute,
    CloudManagedDb,
    CloudManagedCache,
}

impl ToolFamily {
    pub const ALL: [ToolFamily; 7] = [
        ToolFamily::Cache,
        ToolFamily::RelationalDb,
        ToolFamily::Proxy,
        ToolFamily::Container,
        ToolFamily::CloudCompute,
        ToolFamily::CloudManagedDb,
        ToolFamily::CloudManagedCache,
    ];

    /// Value used as `resource_type` on descriptors.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolFamily::Cache => "cache",
            ToolFamily::RelationalDb => "relational_db",
            ToolFamily::Proxy => "proxy",
            ToolFamily::Container => "container",
            ToolFamily::CloudCompute => "cloud_compute",
            ToolFamily::CloudManagedDb => "cloud_managed_db",
            ToolFamily::CloudManagedCache => "cloud_managed_cache",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(value))
    }

    /// Monitored resource kind this family acts on.
    pub fn resource_kind(&self) -> ResourceKind {
        match self {
            ToolFamily::Cache | ToolFamily::CloudManagedCache => ResourceKind::Cache,
            ToolFamily::RelationalDb | ToolFamily::CloudManagedDb => ResourceKind::RelationalDb,
            ToolFamily::Proxy => ResourceKind::Proxy,
            ToolFamily::Container => ResourceKind::Container,
            ToolFamily::CloudCompute => ResourceKind::CloudInstance,
        }
    }
}

impl fmt::Display for ToolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment-specific defaults baked into tool schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefaults {
    pub cache_container: String,
    pub db_container: String,
    pub proxy_container: String,

    /// Cloud project used when a step omits `project_id`.
    #[serde(default)]
    pub project_id: Option<String>,

    /// Compute zone used when a step omits `zone`.
    pub zone: String,

    /// Region used when a step omits `location`.
    pub region: String,
}

impl Default for ToolDefaults {
    fn default() -> Self {
        Self {
            cache_container: "redis".to_string(),
            db_container: "postgres".to_string(),
            proxy_container: "nginx".to_string(),
            project_id: None,
            zone: "us-central1-a".to_string(),
            region: "us-central1".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_names() {
        for family in ToolFamily::ALL {
            assert_eq!(ToolFamily::parse(family.as_str()), Some(family));
        }
        assert_eq!(ToolFamily::parse("CACHE"), Some(ToolFamily::Cache));
        assert_eq!(ToolFamily::parse("mainframe"), None);
    }
}
