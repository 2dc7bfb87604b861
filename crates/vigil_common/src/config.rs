//! Configuration management for vigild.
//!
//! Loads settings from /etc/vigil/config.toml (or a path given on the
//! command line) and falls back to defaults when the file is missing.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/vigil/config.toml";

/// Environment variable consulted when `scheduler.api_key` is empty
pub const API_KEY_ENV: &str = "VIGIL_API_KEY";

/// Default scan period (1 hour)
pub const DEFAULT_FREQUENCY_SECS: u64 = 3600;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("API key is not configured (set scheduler.api_key or VIGIL_API_KEY)")]
    MissingApiKey,

    #[error("Log source URL is empty")]
    EmptyLogSourceUrl,
}

// ============================================================================
// [scheduler]
// ============================================================================

/// Runtime-swappable settings for the scan/report pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_log_source_url")]
    pub log_source_url: String,

    #[serde(default = "default_job_name")]
    pub job_name: String,

    /// kubeconfig path; `None` means in-cluster / ambient kubectl config
    #[serde(default)]
    pub cluster_config_path: Option<String>,

    #[serde(default)]
    pub api_key: String,

    /// Seconds between scan cycles. 0 is treated as the 1 hour default.
    #[serde(default = "default_frequency_seconds")]
    pub frequency_seconds: u64,
}

fn default_log_source_url() -> String {
    "http://localhost:3100".to_string()
}

fn default_job_name() -> String {
    "app".to_string()
}

fn default_frequency_seconds() -> u64 {
    DEFAULT_FREQUENCY_SECS
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            log_source_url: default_log_source_url(),
            job_name: default_job_name(),
            cluster_config_path: None,
            api_key: String::new(),
            frequency_seconds: default_frequency_seconds(),
        }
    }
}

impl SchedulerConfig {
    /// Reject settings the pipeline cannot be built from
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.log_source_url.trim().is_empty() {
            return Err(ConfigError::EmptyLogSourceUrl);
        }
        Ok(())
    }

    /// Effective period with the zero clamp applied
    pub fn frequency(&self) -> std::time::Duration {
        let secs = if self.frequency_seconds == 0 {
            DEFAULT_FREQUENCY_SECS
        } else {
            self.frequency_seconds
        };
        std::time::Duration::from_secs(secs)
    }
}

// ============================================================================
// [llm]
// ============================================================================

/// OpenAI-compatible chat endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_endpoint() -> String {
    "https://api.openai.com".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

// ============================================================================
// [search]
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_search_url")]
    pub url: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

fn default_search_url() -> String {
    "http://localhost:6333".to_string()
}

fn default_collection() -> String {
    "simulation_logs".to_string()
}

fn default_search_timeout() -> u64 {
    30
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            url: default_search_url(),
            collection: default_collection(),
            timeout_secs: default_search_timeout(),
        }
    }
}

// ============================================================================
// [storage]
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_bugs_dir")]
    pub bugs_dir: PathBuf,

    #[serde(default = "default_investigations_dir")]
    pub investigations_dir: PathBuf,

    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
}

fn default_bugs_dir() -> PathBuf {
    PathBuf::from("/var/lib/vigil/bugs")
}

fn default_investigations_dir() -> PathBuf {
    PathBuf::from("/var/lib/vigil/investigations")
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("/var/lib/vigil/reports")
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            bugs_dir: default_bugs_dir(),
            investigations_dir: default_investigations_dir(),
            reports_dir: default_reports_dir(),
        }
    }
}

impl StorageSettings {
    /// All three directories under one root (tests, local runs)
    pub fn under(root: &Path) -> Self {
        Self {
            bugs_dir: root.join("bugs"),
            investigations_dir: root.join("investigations"),
            reports_dir: root.join("reports"),
        }
    }
}

// ============================================================================
// [probes]
// ============================================================================

/// Targets and timeouts for the diagnostic probe set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeSettings {
    #[serde(default = "default_network_host")]
    pub network_host: String,

    #[serde(default = "default_network_port")]
    pub network_port: u16,

    #[serde(default = "default_network_timeout")]
    pub network_timeout_secs: u64,

    #[serde(default = "default_log_backend_url")]
    pub log_backend_url: String,

    #[serde(default = "default_metrics_url")]
    pub metrics_url: String,

    #[serde(default = "default_service_health_url")]
    pub service_health_url: String,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_db_host")]
    pub db_host: String,

    #[serde(default = "default_db_port")]
    pub db_port: u16,

    #[serde(default = "default_db_name")]
    pub db_name: String,

    #[serde(default = "default_db_timeout")]
    pub db_timeout_secs: u64,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_pod_status_timeout")]
    pub pod_status_timeout_secs: u64,

    #[serde(default = "default_pod_logs_timeout")]
    pub pod_logs_timeout_secs: u64,

    #[serde(default = "default_pod_log_tail")]
    pub pod_log_tail: u32,

    #[serde(default = "default_required_env_vars")]
    pub required_env_vars: Vec<String>,

    /// Relative source paths from bug records are resolved against this
    #[serde(default)]
    pub code_root: Option<PathBuf>,

    #[serde(default = "default_context_lines")]
    pub context_lines: usize,

    #[serde(default = "default_recent_changes_hours")]
    pub recent_changes_hours: u32,
}

fn default_network_host() -> String {
    "8.8.8.8".to_string()
}

fn default_network_port() -> u16 {
    53
}

fn default_network_timeout() -> u64 {
    3
}

fn default_log_backend_url() -> String {
    "http://localhost:3100".to_string()
}

fn default_metrics_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_service_health_url() -> String {
    "http://localhost:8000/health".to_string()
}

fn default_http_timeout() -> u64 {
    5
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "postgres".to_string()
}

fn default_db_timeout() -> u64 {
    5
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_pod_status_timeout() -> u64 {
    10
}

fn default_pod_logs_timeout() -> u64 {
    15
}

fn default_pod_log_tail() -> u32 {
    50
}

fn default_required_env_vars() -> Vec<String> {
    ["OPENAI_API_KEY", "OPENAI_MODEL", "DATABASE_URL", "REDIS_URL"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_context_lines() -> usize {
    10
}

fn default_recent_changes_hours() -> u32 {
    24
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            network_host: default_network_host(),
            network_port: default_network_port(),
            network_timeout_secs: default_network_timeout(),
            log_backend_url: default_log_backend_url(),
            metrics_url: default_metrics_url(),
            service_health_url: default_service_health_url(),
            http_timeout_secs: default_http_timeout(),
            db_host: default_db_host(),
            db_port: default_db_port(),
            db_name: default_db_name(),
            db_timeout_secs: default_db_timeout(),
            namespace: default_namespace(),
            pod_status_timeout_secs: default_pod_status_timeout(),
            pod_logs_timeout_secs: default_pod_logs_timeout(),
            pod_log_tail: default_pod_log_tail(),
            required_env_vars: default_required_env_vars(),
            code_root: None,
            context_lines: default_context_lines(),
            recent_changes_hours: default_recent_changes_hours(),
        }
    }
}

// ============================================================================
// [logging]
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ============================================================================
// Top level
// ============================================================================

/// Full daemon configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VigilConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub search: SearchSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub probes: ProbeSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl VigilConfig {
    /// Load from `path` (or the system config path). A missing or broken
    /// file yields defaults; the API key env fallback is applied either way.
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.unwrap_or_else(|| Path::new(CONFIG_PATH));
        let mut config = Self::load_from_path(path).unwrap_or_else(|e| {
            warn!("Config not loaded, using defaults: {}", e);
            VigilConfig::default()
        });
        config.apply_api_key_fallback(std::env::var(API_KEY_ENV).ok());
        config
    }

    /// Load config from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Fill an empty `scheduler.api_key` from the environment value
    pub fn apply_api_key_fallback(&mut self, env_value: Option<String>) {
        if !self.scheduler.api_key.trim().is_empty() {
            return;
        }
        if let Some(key) = env_value.filter(|k| !k.trim().is_empty()) {
            self.scheduler.api_key = key;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = VigilConfig::default();
        assert_eq!(config.scheduler.frequency_seconds, 3600);
        assert_eq!(config.probes.network_host, "8.8.8.8");
        assert_eq!(config.probes.network_port, 53);
        assert_eq!(config.probes.pod_log_tail, 50);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = VigilConfig::from_toml(
            r#"
            [scheduler]
            job_name = "checkout"
            frequency_seconds = 600

            [probes]
            db_port = 3306
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.job_name, "checkout");
        assert_eq!(config.scheduler.frequency_seconds, 600);
        assert_eq!(config.scheduler.log_source_url, "http://localhost:3100");
        assert_eq!(config.probes.db_port, 3306);
        assert_eq!(config.probes.db_host, "localhost");
        assert_eq!(config.llm, LlmSettings::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = \"debug\"").unwrap();

        let config = VigilConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = VigilConfig::load_from_path(Path::new("/nonexistent/vigil.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_api_key_fallback() {
        let mut config = VigilConfig::default();
        config.apply_api_key_fallback(Some("sk-env".to_string()));
        assert_eq!(config.scheduler.api_key, "sk-env");

        config.apply_api_key_fallback(Some("sk-other".to_string()));
        assert_eq!(config.scheduler.api_key, "sk-env");
    }

    #[test]
    fn test_validate_and_frequency_clamp() {
        let mut scheduler = SchedulerConfig::default();
        assert!(matches!(scheduler.validate(), Err(ConfigError::MissingApiKey)));

        scheduler.api_key = "sk-test".to_string();
        scheduler.log_source_url = "  ".to_string();
        assert!(matches!(scheduler.validate(), Err(ConfigError::EmptyLogSourceUrl)));

        scheduler.frequency_seconds = 0;
        assert_eq!(scheduler.frequency().as_secs(), 3600);
    }
}
