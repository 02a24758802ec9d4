use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::FaultlineError;

/// Environment variables override file values, e.g. `FAULTLINE__CHANNEL__PORT=9100`.
pub const ENV_PREFIX: &str = "FAULTLINE";

#[derive(Debug, Deserialize, Clone)]
pub struct FaultlineConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    pub channel: ChannelConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// Which implementation backs the summary store or the event stream.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Postgres,
    Memory,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Postgres => "postgres",
            Backend::Memory => "memory",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default = "default_summary_table")]
    pub summary_table: String,
}

fn default_summary_table() -> String {
    "exception_summaries".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            summary_table: default_summary_table(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StreamConfig {
    pub backend: Backend,
    pub topic: String,
    pub group_id: String,
    pub poll_interval_ms: u64,
    pub batch_size: u32,
    pub memory_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            topic: "exception-topic".to_string(),
            group_id: "faultline".to_string(),
            poll_interval_ms: 500,
            batch_size: 100,
            memory_capacity: 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub url: String,
    pub query_param: String,
    /// Unset means the HTTP client never gives up on a slow inference call.
    pub timeout_seconds: Option<u64>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5000/exception-llm-summary".to_string(),
            query_param: "name".to_string(),
            timeout_seconds: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    #[serde(default = "default_channel_host")]
    pub host: String,
    #[serde(default = "default_channel_port")]
    pub port: u16,
    pub shared_secret: String,
}

fn default_channel_host() -> String {
    "0.0.0.0".to_string()
}

fn default_channel_port() -> u16 {
    9000
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl FaultlineConfig {
    /// Load from an optional TOML file, then layer `FAULTLINE__*` environment variables.
    pub fn load(path: &str) -> Result<Self, FaultlineError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Startup-time checks for values the relay cannot run without.
    pub fn validate(&self) -> Result<(), FaultlineError> {
        if self.channel.shared_secret.trim().is_empty() {
            return Err(FaultlineError::InvalidConfig(
                "channel.shared_secret must be set".to_string(),
            ));
        }

        if self.needs_database() {
            match &self.database {
                Some(db) if !db.url.trim().is_empty() => {}
                _ => {
                    return Err(FaultlineError::InvalidConfig(
                        "database.url is required when a postgres backend is selected"
                            .to_string(),
                    ))
                }
            }
        }

        if !is_sql_identifier(&self.store.summary_table) {
            return Err(FaultlineError::InvalidConfig(format!(
                "store.summary_table is not a valid table name: {:?}",
                self.store.summary_table
            )));
        }

        if self.stream.topic.trim().is_empty() || self.stream.group_id.trim().is_empty() {
            return Err(FaultlineError::InvalidConfig(
                "stream.topic and stream.group_id must be set".to_string(),
            ));
        }

        if self.stream.batch_size == 0 || self.stream.memory_capacity == 0 {
            return Err(FaultlineError::InvalidConfig(
                "stream.batch_size and stream.memory_capacity must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn needs_database(&self) -> bool {
        self.store.backend == Backend::Postgres || self.stream.backend == Backend::Postgres
    }
}

/// Table names are interpolated into SQL, so only plain lowercase identifiers pass.
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
