use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub stages: StagesConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("forge.db")
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of the human readable format.
    #[serde(default)]
    pub json: bool,
}

/// Refinement engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Maximum implement/verify/review rounds per task (default: 3)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Upper bound for a single stage call in seconds (default: 300)
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,
    /// Character budget of the feedback summary carried between iterations (default: 2000)
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            stage_timeout_secs: default_stage_timeout_secs(),
            summary_max_chars: default_summary_max_chars(),
        }
    }
}

fn default_max_iterations() -> u32 {
    3
}

fn default_stage_timeout_secs() -> u64 {
    300
}

fn default_summary_max_chars() -> usize {
    2000
}

/// Scheduler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Number of task pipelines allowed to execute at once (default: 6)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_max_concurrent() -> usize {
    6
}

/// Remote stage service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StagesConfig {
    /// Base URL of the stage service (e.g., "http://localhost:9200")
    #[serde(default = "default_stages_url")]
    pub base_url: String,
    /// Optional bearer token sent with every stage request
    #[serde(default)]
    pub api_key: Option<String>,
    /// HTTP request timeout in seconds (default: 600)
    #[serde(default = "default_stages_timeout")]
    pub timeout_secs: u64,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            base_url: default_stages_url(),
            api_key: None,
            timeout_secs: default_stages_timeout(),
        }
    }
}

fn default_stages_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_stages_timeout() -> u64 {
    600
}

/// Progress event sink configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProgressConfig {
    /// Capacity of the event channel feeding the writer (default: 1000)
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
        }
    }
}

fn default_buffer_size() -> usize {
    1000
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub engine: EngineConfig,
    pub scheduler: SchedulerConfig,
    pub stages: SanitizedStagesConfig,
    pub progress: ProgressConfig,
}

/// Sanitized stage service config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStagesConfig {
    pub base_url: String,
    pub api_key_configured: bool,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            logging: config.logging.clone(),
            engine: config.engine.clone(),
            scheduler: config.scheduler.clone(),
            stages: SanitizedStagesConfig {
                base_url: config.stages.base_url.clone(),
                api_key_configured: config
                    .stages
                    .api_key
                    .as_ref()
                    .is_some_and(|k| !k.is_empty()),
                timeout_secs: config.stages.timeout_secs,
            },
            progress: config.progress.clone(),
        }
    }
}
