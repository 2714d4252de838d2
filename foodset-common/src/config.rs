//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`FOODSET_ROOT_FOLDER`)
//! 3. TOML config file (`root_folder`)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "FOODSET_ROOT_FOLDER";

/// Environment variable pointing at the TOML config file
pub const CONFIG_PATH_ENV: &str = "FOODSET_CONFIG";

/// Environment variable carrying the image search API key
pub const PROVIDER_API_KEY_ENV: &str = "FOODSET_PROVIDER_API_KEY";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "foodset.db";

/// Bootstrap configuration loaded from the TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder for the database and collected images (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Collection quotas and worker pool settings
    #[serde(default)]
    pub collector: CollectorSection,

    /// Image search provider settings
    #[serde(default)]
    pub provider: ProviderSection,

    /// Food categories, in class-index order
    #[serde(default)]
    pub categories: Vec<CategoryConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// `[collector]` section
///
/// Values are validated by the collector at startup; nothing here is
/// checked at parse time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorSection {
    /// Target image count per category in the training partition
    #[serde(default = "default_train_quota")]
    pub train_quota: u32,

    /// Target image count per category in the evaluation partition
    #[serde(default = "default_eval_quota")]
    pub eval_quota: u32,

    /// Fetch worker count; `None` means auto-detect (half the logical CPUs)
    #[serde(default)]
    pub workers: Option<usize>,

    /// Per-category provider call timeout
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Minimum trainable samples before training may start
    #[serde(default = "default_trainable_threshold")]
    pub trainable_threshold: u32,

    /// Confidence at which an unverified prediction counts as trainable
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

impl Default for CollectorSection {
    fn default() -> Self {
        Self {
            train_quota: default_train_quota(),
            eval_quota: default_eval_quota(),
            workers: None,
            fetch_timeout_secs: default_fetch_timeout_secs(),
            trainable_threshold: default_trainable_threshold(),
            min_confidence: default_min_confidence(),
        }
    }
}

/// `[provider]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSection {
    /// Image search endpoint
    #[serde(default = "default_provider_endpoint")]
    pub endpoint: String,

    /// API key (the environment variable takes precedence)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Token bucket rate for search and download requests
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Minimum image width passed to the search API
    #[serde(default = "default_min_dimension")]
    pub min_width: u32,

    /// Minimum image height passed to the search API
    #[serde(default = "default_min_dimension")]
    pub min_height: u32,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            endpoint: default_provider_endpoint(),
            api_key: None,
            requests_per_second: default_requests_per_second(),
            min_width: default_min_dimension(),
            min_height: default_min_dimension(),
        }
    }
}

/// One `[[categories]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Category key; also the storage subdirectory name
    pub key: String,

    /// Human display label (defaults to the key)
    #[serde(default)]
    pub label: Option<String>,

    /// Alternate names used when inferring labels from descriptions
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Search term override (defaults to the key)
    #[serde(default)]
    pub query: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_train_quota() -> u32 {
    50
}

fn default_eval_quota() -> u32 {
    10
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_trainable_threshold() -> u32 {
    20
}

fn default_min_confidence() -> f64 {
    0.6
}

fn default_provider_endpoint() -> String {
    "https://api.bing.microsoft.com/v7.0/images/search".to_string()
}

fn default_requests_per_second() -> u32 {
    3
}

fn default_min_dimension() -> u32 {
    500
}

/// Resolve the root folder following the priority order in the module docs
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Resolve the config file path: CLI → `FOODSET_CONFIG` → platform config dir
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir().map(|d| d.join("foodset").join("config.toml"))
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("foodset"))
        .unwrap_or_else(|| PathBuf::from("./foodset_data"))
}

/// Load and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    parse_toml_config(&content)
}

/// Parse TOML config content
pub fn parse_toml_config(content: &str) -> Result<TomlConfig> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Load the config file if it exists, otherwise fall back to defaults
///
/// An explicitly requested file (CLI or environment) that is missing is an
/// error; a missing file at the platform default location is not.
pub fn load_or_default(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let explicit = cli_arg.is_some() || std::env::var(CONFIG_PATH_ENV).is_ok();

    match resolve_config_path(cli_arg) {
        Some(path) if path.exists() => {
            tracing::info!("Loading config from {}", path.display());
            load_toml_config(&path)
        }
        Some(path) if explicit => Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        ))),
        _ => {
            tracing::warn!("No config file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Resolve the provider API key: environment first, then TOML
pub fn resolve_provider_api_key(toml_config: &TomlConfig) -> Option<String> {
    if let Ok(key) = std::env::var(PROVIDER_API_KEY_ENV) {
        if !key.trim().is_empty() {
            return Some(key);
        }
    }

    toml_config
        .provider
        .api_key
        .as_ref()
        .filter(|k| !k.trim().is_empty())
        .cloned()
}
