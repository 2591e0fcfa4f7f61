//! Configuration model and loading
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `PRODSCAN_CONFIG` environment variable
//! 3. `<config dir>/prodscan/<module>.toml` (OS-dependent)
//!
//! A missing file is not an error: every field has a compiled default and the
//! caller is told which source was used so it can warn after logging is up.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PRODSCAN_CONFIG";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub vision: VisionConfig,
    pub term_oracle: TermOracleConfig,
    pub catalog: CatalogConfig,
    pub pipeline: PipelineConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Upper bound on the multipart request body
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 5000,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Logging settings (`RUST_LOG` takes precedence when set)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Visual-annotation oracle (Google Cloud Vision REST API)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://vision.googleapis.com/v1/images:annotate".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

/// Term-generation oracle (OpenAI-compatible chat completions)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermOracleConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Language the search term must be written in
    pub target_language: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for TermOracleConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            model: "gpt-3.5-turbo".to_string(),
            target_language: "Spanish".to_string(),
            temperature: 0.2,
            max_tokens: 32,
            timeout_secs: 30,
        }
    }
}

/// Product catalog (OpenFoodFacts)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Base URL for `/{code}.json` product lookups; also the base for product links
    pub product_url: String,
    pub search_url: String,
    pub user_agent: String,
    pub requests_per_minute: u32,
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            product_url: "https://world.openfoodfacts.org/api/v0/product".to_string(),
            search_url: "https://world.openfoodfacts.org/cgi/search.pl".to_string(),
            user_agent: concat!("prodscan/", env!("CARGO_PKG_VERSION")).to_string(),
            requests_per_minute: 100,
            timeout_secs: 30,
        }
    }
}

/// Identification pipeline tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum detections requested from object localization
    pub max_objects: u32,
    /// Regions analyzed concurrently (events are still emitted in index order)
    pub region_concurrency: usize,
    /// Capacity of the event channel between pipeline and response writer
    pub event_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_objects: 100,
            region_concurrency: 1,
            event_buffer: 16,
        }
    }
}

impl TomlConfig {
    /// Reject values that would stall or misconfigure the service
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.region_concurrency == 0 {
            return Err(Error::Config(
                "pipeline.region_concurrency must be at least 1".to_string(),
            ));
        }
        if self.pipeline.event_buffer == 0 {
            return Err(Error::Config(
                "pipeline.event_buffer must be at least 1".to_string(),
            ));
        }
        if self.pipeline.max_objects == 0 {
            return Err(Error::Config(
                "pipeline.max_objects must be at least 1".to_string(),
            ));
        }
        if self.catalog.requests_per_minute == 0 {
            return Err(Error::Config(
                "catalog.requests_per_minute must be at least 1".to_string(),
            ));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(Error::Config(
                "server.max_upload_bytes must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the effective configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from this file
    File(PathBuf),
    /// Compiled defaults; `missing` is the path that was looked for, if any
    Defaults { missing: Option<PathBuf> },
}

/// Resolves and loads the TOML config file for one module
pub struct ConfigResolver {
    module_name: String,
}

impl ConfigResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
        }
    }

    /// Resolve the config file path (CLI → ENV → OS config directory)
    pub fn resolve_path(&self, cli_arg: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = cli_arg {
            return Some(path.to_path_buf());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        dirs::config_dir().map(|dir| {
            dir.join("prodscan")
                .join(format!("{}.toml", self.module_name))
        })
    }

    /// Load configuration, falling back to defaults when no file exists
    pub fn load(&self, cli_arg: Option<&Path>) -> Result<(TomlConfig, ConfigSource)> {
        let path = match self.resolve_path(cli_arg) {
            Some(path) => path,
            None => return Ok((TomlConfig::default(), ConfigSource::Defaults { missing: None })),
        };

        if !path.exists() {
            return Ok((
                TomlConfig::default(),
                ConfigSource::Defaults {
                    missing: Some(path),
                },
            ));
        }

        let config = load_toml_config(&path)?;
        Ok((config, ConfigSource::File(path)))
    }
}

/// Read, parse and validate a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    config.validate()?;
    Ok(config)
}
