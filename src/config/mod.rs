//! Runtime configuration loaded from `metatype.toml`

use crate::logging::{parse_level, LogConfig};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name searched for by [`Config::discover`]
pub const CONFIG_FILE_NAME: &str = "metatype.toml";

/// Configuration applied by the last `init_with_config` call
static ACTIVE: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::default()));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub signals: SignalConfig,

    #[serde(default)]
    pub allocator: AllocatorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Initial descriptor table capacity
    #[serde(default = "default_type_capacity")]
    pub type_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Initial per-process connection table capacity
    #[serde(default = "default_table_capacity")]
    pub table_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// Largest single class or instance block, in bytes
    #[serde(default = "default_max_block_size")]
    pub max_block_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,

    #[serde(default)]
    pub file: Option<String>,

    #[serde(default)]
    pub spans: bool,

    /// Time registration, class construction and emission
    #[serde(default)]
    pub performance: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            signals: SignalConfig::default(),
            allocator: AllocatorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            type_capacity: default_type_capacity(),
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            table_capacity: default_table_capacity(),
        }
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            max_block_size: default_max_block_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            file: None,
            spans: false,
            performance: false,
        }
    }
}

fn default_type_capacity() -> usize { 256 }
fn default_table_capacity() -> usize { 64 }
fn default_max_block_size() -> usize { 1 << 20 }
fn default_level() -> String { "info".to_string() }

impl LoggingConfig {
    /// Convert to the subscriber configuration
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: parse_level(&self.level),
            file_output: self.file.is_some(),
            log_path: self.file.clone(),
            json_format: self.json,
            show_spans: self.spans,
            track_performance: self.performance,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Find `metatype.toml` in `start` or its parents
    pub fn discover_from(start: &Path) -> Option<PathBuf> {
        let mut current = Some(start.to_path_buf());

        while let Some(dir) = current {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.is_file() {
                return Some(config_path);
            }
            current = dir.parent().map(|p| p.to_path_buf());
        }

        None
    }

    /// Load the nearest configuration above the current directory, or defaults
    pub fn discover() -> Self {
        std::env::current_dir()
            .ok()
            .and_then(|dir| Self::discover_from(&dir))
            .and_then(|path| Self::load(&path).ok())
            .unwrap_or_default()
    }

    /// Generate default configuration file content
    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate config"))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Configuration currently in effect
pub fn active() -> Config {
    ACTIVE.read().clone()
}

pub(crate) fn set_active(config: Config) {
    *ACTIVE.write() = config;
}

pub(crate) fn max_block_size() -> usize {
    ACTIVE.read().allocator.max_block_size
}
