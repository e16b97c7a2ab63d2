//! Log entries and time ranges

use crate::ids::ResourceId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a log entry, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Infer a severity from free-form log text.
    pub fn detect(message: &str) -> Self {
        let upper = message.to_uppercase();
        if upper.contains("CRITICAL") || upper.contains("FATAL") || upper.contains("PANIC") {
            Severity::Critical
        } else if upper.contains("ERROR") {
            Severity::Error
        } else if upper.contains("WARN") {
            Severity::Warning
        } else {
            Severity::Info
        }
    }

    /// Warning and above count as error-level for failure analysis.
    pub fn is_error_level(&self) -> bool {
        *self >= Severity::Warning
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "INFO" => Some(Severity::Info),
            "WARNING" | "WARN" => Some(Severity::Warning),
            "ERROR" => Some(Severity::Error),
            "CRITICAL" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// One immutable log line attributed to a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub resource_id: ResourceId,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl LogEntry {
    pub fn new(resource_id: ResourceId, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            resource_id,
            severity,
            message: message.into(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Entry whose severity is detected from the message text.
    pub fn detected(resource_id: ResourceId, message: impl Into<String>) -> Self {
        let message = message.into();
        let severity = Severity::detect(&message);
        Self::new(resource_id, severity, message)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Closed time interval used for log queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl TimeRange {
    /// The interval ending now and spanning `span`, clamped to the earliest
    /// representable instant.
    pub fn last(span: Duration) -> Self {
        let until = Utc::now();
        Self {
            since: until.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC),
            until,
        }
    }

    /// Parse a relative span such as `15m`, `1h`, `2d` or `30s`.
    pub fn parse_relative(value: &str) -> Option<Self> {
        let value = value.trim();
        let (split, unit) = value.char_indices().last()?;
        let amount: i64 = value[..split].parse().ok().filter(|n| *n > 0)?;
        let span = match unit {
            's' => Duration::try_seconds(amount),
            'm' => Duration::try_minutes(amount),
            'h' => Duration::try_hours(amount),
            'd' => Duration::try_days(amount),
            _ => None,
        }?;
        let until = Utc::now();
        let since = until.checked_sub_signed(span)?;
        Some(Self { since, until })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.since && at <= self.until
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_severity() {
        assert_eq!(Severity::detect("FATAL: out of memory"), Severity::Critical);
        assert_eq!(Severity::detect("connection error"), Severity::Error);
        assert_eq!(Severity::detect("# WARNING overcommit_memory"), Severity::Warning);
        assert_eq!(Severity::detect("ready to accept connections"), Severity::Info);
    }

    #[test]
    fn test_error_level() {
        assert!(Severity::Warning.is_error_level());
        assert!(Severity::Critical.is_error_level());
        assert!(!Severity::Info.is_error_level());
    }

    #[test]
    fn test_parse_relative_time_range() {
        let range = TimeRange::parse_relative("15m").unwrap();
        assert_eq!(range.until - range.since, Duration::minutes(15));

        assert!(TimeRange::parse_relative("2d").is_some());
        assert!(TimeRange::parse_relative("h").is_none());
        assert!(TimeRange::parse_relative("0h").is_none());
        assert!(TimeRange::parse_relative("5y").is_none());
    }

    #[test]
    fn test_parse_relative_rejects_unrepresentable_spans() {
        assert!(TimeRange::parse_relative("1é").is_none());
        assert!(TimeRange::parse_relative("é").is_none());
        assert!(TimeRange::parse_relative("").is_none());
        assert!(TimeRange::parse_relative("0m").is_none());
        assert!(TimeRange::parse_relative("100000000d").is_none());
        assert!(TimeRange::parse_relative("9223372036854775807s").is_none());

        let clamped = TimeRange::last(Duration::MAX);
        assert_eq!(clamped.since, DateTime::<Utc>::MIN_UTC);
    }
}
