//! Configuration for mender-daemon

use std::net::SocketAddr;
use std::time::Duration;

use mender_analysis::{AnalysisConfig, ProviderConfig, ProviderKind};
use mender_engine::OrchestratorConfig;
use mender_monitor::{MonitorConfig, ThresholdConfig};
use mender_tools::ToolDefaults;
use mender_types::{ResourceDescriptor, ResourceKind};
use serde::{Deserialize, Serialize};

/// Main daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Evaluation storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Resource monitor and log window
    #[serde(default)]
    pub monitor: MonitorSection,

    /// Fix workflow
    #[serde(default)]
    pub orchestrator: OrchestratorSection,

    /// Reasoning provider
    #[serde(default)]
    pub llm: LlmConfig,

    /// Monitored resources
    #[serde(default = "default_resources")]
    pub resources: Vec<ResourceConfig>,

    /// Tool schema defaults
    #[serde(default)]
    pub tools: ToolDefaults,

    /// Where metrics are read and tools are executed
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Free-form application description handed to the analysis prompt
    #[serde(default = "default_application")]
    pub application: serde_json::Value,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            monitor: MonitorSection::default(),
            orchestrator: OrchestratorSection::default(),
            llm: LlmConfig::default(),
            resources: default_resources(),
            tools: ToolDefaults::default(),
            infrastructure: InfrastructureConfig::default(),
            application: default_application(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            enable_cors: true,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    Memory,

    /// SQLite file storage
    Sqlite {
        /// Connection URL
        #[serde(default = "default_sqlite_url")]
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,
    },

    /// PostgreSQL storage
    Postgres {
        /// Connection URL
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,

        /// Connection timeout in seconds
        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            url: default_sqlite_url(),
            max_connections: default_pool_size(),
        }
    }
}

/// Monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSection {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_adapter_timeout")]
    pub adapter_timeout_ms: u64,

    /// Age after which log entries are dropped
    #[serde(default = "default_log_window")]
    pub log_window_secs: u64,

    /// Maximum log entries kept in memory
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    #[serde(default)]
    pub thresholds: ThresholdConfig,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            adapter_timeout_ms: default_adapter_timeout(),
            log_window_secs: default_log_window(),
            log_capacity: default_log_capacity(),
            thresholds: ThresholdConfig::default(),
        }
    }
}

impl MonitorSection {
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            adapter_timeout: Duration::from_millis(self.adapter_timeout_ms),
            thresholds: self.thresholds.clone(),
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Upper bound for one tool call
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Upper bound for one analysis call
    #[serde(default = "default_analysis_timeout")]
    pub analysis_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub reask_on_malformed: bool,

    /// Log window used when a trigger names none
    #[serde(default = "default_time_range")]
    pub default_time_range: String,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            settle_delay_ms: default_settle_delay(),
            retry_delay_ms: default_retry_delay(),
            tool_timeout_secs: default_tool_timeout(),
            analysis_timeout_secs: default_analysis_timeout(),
            reask_on_malformed: true,
            default_time_range: default_time_range(),
        }
    }
}

impl OrchestratorSection {
    pub fn orchestrator_config(&self, application: serde_json::Value) -> OrchestratorConfig {
        OrchestratorConfig {
            max_retries: self.max_retries,
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            default_time_range: self.default_time_range.clone(),
            application,
        }
    }

    pub fn analysis_config(&self, history_limit: usize) -> AnalysisConfig {
        AnalysisConfig {
            timeout: Duration::from_secs(self.analysis_timeout_secs),
            reask_on_malformed: self.reask_on_malformed,
            history_limit,
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

/// Reasoning provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Interactions kept in memory
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            endpoint: None,
            api_key: None,
            temperature: None,
            max_tokens: None,
            timeout_secs: default_llm_timeout(),
            history_limit: default_history_limit(),
        }
    }
}

impl LlmConfig {
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: Duration::from_secs(self.timeout_secs),
            ..ProviderConfig::new(self.provider, self.model.clone())
        }
    }
}

/// One monitored resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub id: String,
    pub name: String,
    pub kind: ResourceKind,

    /// Container, instance or host the adapters address. Defaults to `name`.
    #[serde(default)]
    pub target: Option<String>,
}

impl ResourceConfig {
    fn new(id: &str, name: &str, kind: ResourceKind) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            target: None,
        }
    }

    pub fn descriptor(&self) -> ResourceDescriptor {
        let target = self.target.as_deref().unwrap_or(self.name.as_str());
        ResourceDescriptor::new(self.id.as_str(), self.name.as_str(), self.kind).with_target(target)
    }
}

/// Infrastructure access
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InfrastructureConfig {
    /// In-process simulation with failure injection
    #[default]
    Simulated,

    /// Remote agent exposing metrics and operations over HTTP
    Http {
        base_url: String,

        #[serde(default = "default_agent_timeout")]
        timeout_secs: u64,
    },
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_request_timeout() -> u64 {
    30
}

fn default_sqlite_url() -> String {
    "sqlite://evaluation.db".to_string()
}

fn default_pool_size() -> u32 {
    5
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_poll_interval() -> u64 {
    10
}

fn default_adapter_timeout() -> u64 {
    5000
}

fn default_log_window() -> u64 {
    3600
}

fn default_log_capacity() -> usize {
    5000
}

fn default_max_retries() -> u32 {
    2
}

fn default_settle_delay() -> u64 {
    2000
}

fn default_retry_delay() -> u64 {
    3000
}

fn default_tool_timeout() -> u64 {
    60
}

fn default_analysis_timeout() -> u64 {
    120
}

fn default_time_range() -> String {
    "1h".to_string()
}

fn default_provider() -> ProviderKind {
    ProviderKind::Gemini
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_history_limit() -> usize {
    500
}

fn default_agent_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_resources() -> Vec<ResourceConfig> {
    vec![
        ResourceConfig::new("redis", "redis", ResourceKind::Cache),
        ResourceConfig::new("postgres", "postgres", ResourceKind::RelationalDb),
        ResourceConfig::new("nginx", "nginx", ResourceKind::Proxy),
        ResourceConfig::new("sample-app", "sample-app", ResourceKind::Container),
    ]
}

fn default_application() -> serde_json::Value {
    serde_json::json!({
        "name": "sample-app",
        "description": "Web application behind nginx with a redis cache and a postgres database",
        "dependencies": ["redis", "postgres", "nginx"],
    })
}

impl DaemonConfig {
    /// Load configuration from file
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Add environment variables with MENDER_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("MENDER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: DaemonConfig = builder.build()?.try_deserialize()?;
        config.llm.api_key = config.llm.api_key.take().filter(|k| !k.is_empty()).or_else(api_key_from_env);
        Ok(config)
    }

    /// In-memory development configuration
    pub fn development() -> Self {
        Self {
            storage: StorageConfig::Memory,
            ..Default::default()
        }
    }

    pub fn descriptors(&self) -> Vec<ResourceDescriptor> {
        self.resources.iter().map(ResourceConfig::descriptor).collect()
    }
}

fn api_key_from_env() -> Option<String> {
    ["MENDER_LLM_API_KEY", "GEMINI_API_KEY"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8000);
        assert!(matches!(config.storage, StorageConfig::Sqlite { .. }));
        assert_eq!(config.infrastructure, InfrastructureConfig::Simulated);
        assert_eq!(config.resources.len(), 4);
    }

    #[test]
    fn test_orchestrator_defaults() {
        let section = OrchestratorSection::default();
        let config = section.orchestrator_config(serde_json::Value::Null);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.settle_delay, Duration::from_secs(2));
        assert_eq!(config.retry_delay, Duration::from_secs(3));
        assert_eq!(section.analysis_config(10).timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_storage_config_is_tagged() {
        let storage: StorageConfig =
            serde_json::from_value(serde_json::json!({"type": "postgres", "url": "postgres://db/mender"}))
                .unwrap();
        assert_eq!(
            storage,
            StorageConfig::Postgres {
                url: "postgres://db/mender".to_string(),
                max_connections: 5,
                connect_timeout_secs: 5,
            }
        );
    }

    #[test]
    fn test_resource_target_defaults_to_name() {
        let resource: ResourceConfig = serde_json::from_value(serde_json::json!({
            "id": "cache-1",
            "name": "redis",
            "kind": "cache"
        }))
        .unwrap();
        let descriptor = resource.descriptor();
        assert_eq!(descriptor.target(), "redis");
    }

    #[test]
    fn test_load_without_file() {
        let config = DaemonConfig::load(None).unwrap();
        assert_eq!(config.llm.model, "gemini-2.5-flash");
        assert_eq!(config.monitor.poll_interval_secs, 10);
    }
}
