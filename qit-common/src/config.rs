//! Configuration loading
//!
//! Bootstrap configuration comes from a TOML file. Priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is not fatal: a warning is logged and the compiled
//! defaults are used. A config file that exists but cannot be parsed is.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::defect::NO_VISIBLE_DEFECT;
use crate::{Error, Result};

/// Environment variable naming the config file
pub const ENV_CONFIG: &str = "QIT_CONFIG";
/// Environment variable holding the vision API key
pub const ENV_VISION_API_KEY: &str = "QIT_VISION_API_KEY";
/// Environment variable overriding the remote sheet API URL
pub const ENV_SHEET_API_URL: &str = "QIT_SHEET_API_URL";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5780;

/// Default instruction sent with every image to the vision model
pub const DEFAULT_VISION_INSTRUCTION: &str = "You are inspecting a mobile device for physical \
defects. Describe any visible damage such as cracks, dents, scratches, water damage, button \
damage, speaker damage, back cover damage, burn marks or bulging. If there is no visible \
damage, say so.";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Address to bind the HTTP server to
    #[serde(default = "default_bind")]
    pub bind: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Carton catalog file; the built-in demo catalog when absent
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub workbook: WorkbookConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG wins when set
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Record store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    SheetApi,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// SQLite file; an in-memory database when absent
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Base URL of the remote sheet collection
    #[serde(default)]
    pub sheet_api_url: Option<String>,

    /// Timeout for remote store requests
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Spreadsheet export used for bulk import
#[derive(Debug, Clone, Deserialize)]
pub struct WorkbookConfig {
    /// Path or http(s) URL of the JSON workbook
    #[serde(default)]
    pub source: Option<String>,

    /// Sheet to read records from
    #[serde(default = "default_sheet")]
    pub sheet: String,
}

/// Defect classifier selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    #[default]
    Fixed,
    Vision,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub kind: ClassifierKind,

    /// Chat-completions endpoint of the vision model
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// Bearer key; QIT_VISION_API_KEY overrides
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_instruction")]
    pub instruction: String,

    /// Label returned by the fixed classifier
    #[serde(default = "default_fixed_label")]
    pub fixed_label: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_sheet() -> String {
    "Sheet1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_instruction() -> String {
    DEFAULT_VISION_INSTRUCTION.to_string()
}

fn default_fixed_label() -> String {
    NO_VISIBLE_DEFECT.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            database_path: None,
            sheet_api_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for WorkbookConfig {
    fn default() -> Self {
        Self {
            source: None,
            sheet: default_sheet(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            kind: ClassifierKind::default(),
            endpoint: None,
            model: default_model(),
            api_key: None,
            instruction: default_instruction(),
            fixed_label: default_fixed_label(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            logging: LoggingConfig::default(),
            catalog_path: None,
            store: StoreConfig::default(),
            workbook: WorkbookConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl TomlConfig {
    fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config = Self::parse(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file
    ///
    /// Cross-field checks are left to the caller, since environment
    /// overrides may still fill in required values.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read TOML {} failed: {}", path.display(), e)))?;
        Self::parse(&text)
    }

    /// Check cross-field requirements
    pub fn validate(&self) -> Result<()> {
        if self.store.backend == StoreBackend::SheetApi && self.store.sheet_api_url.is_none() {
            return Err(Error::Config(
                "store.backend = \"sheet_api\" requires store.sheet_api_url".to_string(),
            ));
        }
        if self.classifier.kind == ClassifierKind::Vision && self.classifier.endpoint.is_none() {
            return Err(Error::Config(
                "classifier.kind = \"vision\" requires classifier.endpoint".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment overrides for secrets and endpoints
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(ENV_VISION_API_KEY) {
            if !key.trim().is_empty() {
                self.classifier.api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var(ENV_SHEET_API_URL) {
            if !url.trim().is_empty() {
                self.store.sheet_api_url = Some(url);
            }
        }
    }
}

/// Default config file location for the platform (`<config dir>/qit/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("qit").join("config.toml"))
}

/// Resolve which config file to read: CLI → QIT_CONFIG → platform default
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(ENV_CONFIG) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    default_config_path()
}

/// Load configuration with graceful fallback to compiled defaults
pub fn load_config(cli_path: Option<&Path>) -> Result<TomlConfig> {
    let mut config = match resolve_config_path(cli_path) {
        Some(path) if path.exists() => {
            let config = TomlConfig::load(&path)?;
            info!("Loaded configuration from {}", path.display());
            config
        }
        Some(path) => {
            warn!(
                "Config file {} not found, using compiled defaults",
                path.display()
            );
            TomlConfig::default()
        }
        None => {
            warn!("No config directory on this platform, using compiled defaults");
            TomlConfig::default()
        }
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}
