//! Strongly-typed identifiers for Mender entities
//!
//! Resource ids come from configuration. Fix and interaction ids are generated
//! from UUIDs and keep a readable prefix so they can be used directly in URLs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a monitored resource (e.g. `cache-1`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of a fix workflow and its persisted evaluation (`fix_1a2b3c4d`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixId(String);

impl FixId {
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(format!("fix_{}", &hex[..8]))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FixId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one recorded LLM call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionId(String);

impl InteractionId {
    pub fn generate() -> Self {
        Self(format!("interaction_{}", Uuid::new_v4().simple()))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InteractionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_id_format() {
        let id = FixId::generate();
        let suffix = id.as_str().strip_prefix("fix_").unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(InteractionId::generate(), InteractionId::generate());
    }

    #[test]
    fn test_resource_id_serializes_as_plain_string() {
        let id = ResourceId::new("cache-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"cache-1\"");
    }
}
