//! Log source contract and the in-memory log window.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use mender_types::{LogEntry, ResourceId, Severity, TimeRange};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::MonitorResult;

/// Filter for general log queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogQuery {
    /// Exact severity to match.
    #[serde(default)]
    pub level: Option<Severity>,

    #[serde(default)]
    pub resource_id: Option<ResourceId>,

    /// Return at most this many of the newest matching entries.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Source of recent log entries.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Warning-and-above entries within `range`, oldest first.
    /// `resource_ids` restricts the result when given.
    async fn query_errors(
        &self,
        range: TimeRange,
        resource_ids: Option<&[ResourceId]>,
    ) -> MonitorResult<Vec<LogEntry>>;

    /// Entries matching `query`, oldest first.
    async fn query(&self, query: &LogQuery) -> MonitorResult<Vec<LogEntry>>;
}

/// Bounded ring of recent log entries.
///
/// Entries are dropped when the ring exceeds `capacity` or when they are
/// older than `retention`.
pub struct LogWindow {
    entries: RwLock<VecDeque<LogEntry>>,
    capacity: usize,
    retention: Duration,
}

impl LogWindow {
    pub fn new(capacity: usize, retention: Duration) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            retention,
        }
    }

    /// Append an entry.
    pub fn record(&self, entry: LogEntry) {
        let mut entries = self.entries.write();
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        let cutoff = Utc::now() - self.retention;
        while entries.front().is_some_and(|e| e.timestamp < cutoff) {
            entries.pop_front();
        }
    }

    /// Append a raw message, detecting its severity from the text.
    pub fn record_message(&self, resource_id: ResourceId, message: impl Into<String>) -> Severity {
        let entry = LogEntry::detected(resource_id, message);
        let severity = entry.severity;
        self.record(entry);
        severity
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn collect<F>(&self, limit: Option<usize>, filter: F) -> Vec<LogEntry>
    where
        F: Fn(&LogEntry) -> bool,
    {
        let cutoff = Utc::now() - self.retention;
        let entries = self.entries.read();
        let mut matched: Vec<LogEntry> = entries
            .iter()
            .filter(|e| e.timestamp >= cutoff && filter(e))
            .cloned()
            .collect();

        if let Some(limit) = limit {
            if matched.len() > limit {
                matched.drain(..matched.len() - limit);
            }
        }
        matched
    }
}

impl Default for LogWindow {
    fn default() -> Self {
        Self::new(5000, Duration::hours(1))
    }
}

#[async_trait]
impl LogSource for LogWindow {
    async fn query_errors(
        &self,
        range: TimeRange,
        resource_ids: Option<&[ResourceId]>,
    ) -> MonitorResult<Vec<LogEntry>> {
        Ok(self.collect(None, |e| {
            e.severity.is_error_level()
                && range.contains(e.timestamp)
                && resource_ids.map_or(true, |ids| ids.contains(&e.resource_id))
        }))
    }

    async fn query(&self, query: &LogQuery) -> MonitorResult<Vec<LogEntry>> {
        Ok(self.collect(query.limit, |e| {
            query.level.map_or(true, |level| e.severity == level)
                && query
                    .resource_id
                    .as_ref()
                    .map_or(true, |id| &e.resource_id == id)
        }))
    }
}
