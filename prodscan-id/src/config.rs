//! Credential resolution for prodscan-id
//!
//! API keys resolve with priority ENV → TOML. They are read once at startup
//! and handed to the oracle clients; nothing reads the environment later.

use prodscan_common::config::TomlConfig;
use prodscan_common::{Error, Result};
use tracing::{info, warn};

/// Environment variable holding the Vision API key
pub const VISION_API_KEY_ENV: &str = "PRODSCAN_VISION_API_KEY";

/// Environment variable holding the OpenAI API key
pub const OPENAI_API_KEY_ENV: &str = "PRODSCAN_OPENAI_API_KEY";

/// Resolved oracle credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeys {
    pub vision: String,
    pub term_oracle: String,
}

/// Resolve all API keys required by the service
pub fn resolve_api_keys(config: &TomlConfig) -> Result<ApiKeys> {
    Ok(ApiKeys {
        vision: resolve_api_key(
            "Vision",
            VISION_API_KEY_ENV,
            "vision.api_key",
            config.vision.api_key.as_deref(),
        )?,
        term_oracle: resolve_api_key(
            "OpenAI",
            OPENAI_API_KEY_ENV,
            "term_oracle.api_key",
            config.term_oracle.api_key.as_deref(),
        )?,
    })
}

/// Resolve one API key from environment, then TOML
pub fn resolve_api_key(
    service: &str,
    env_var: &str,
    toml_key: &str,
    toml_value: Option<&str>,
) -> Result<String> {
    let env_key = std::env::var(env_var).ok().filter(|k| is_valid_key(k));
    let toml_key_value = toml_value.filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key_value.is_some() {
        warn!(
            "{} API key found in both environment and TOML. Using environment (highest priority).",
            service
        );
    }

    if let Some(key) = env_key {
        info!("{} API key loaded from environment variable", service);
        return Ok(key.trim().to_string());
    }

    if let Some(key) = toml_key_value {
        info!("{} API key loaded from TOML config", service);
        return Ok(key.trim().to_string());
    }

    Err(Error::Config(format!(
        "{} API key not configured. Set {} or `{}` in the TOML config.",
        service, env_var, toml_key
    )))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
