//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;
use tracing::warn;

use super::types::AppConfig;
use crate::common::errors::{Result, TraderError};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with TRADER, `__` between sections)
/// 2. Configuration file (TOML format)
/// 3. Default values
///
/// The loaded risk parameters are validated before returning.
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        } else {
            warn!(%path, "configuration file not found, using defaults");
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("TRADER")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config: AppConfig = builder
        .build()
        .map_err(|e| TraderError::Configuration(e.to_string()))?
        .try_deserialize()
        .map_err(|e| TraderError::Configuration(e.to_string()))?;

    config.risk.validate()?;
    Ok(config)
}

/// Load configuration from a TOML string, without environment overrides
pub fn load_from_str(toml: &str) -> Result<AppConfig> {
    let config: AppConfig = Config::builder()
        .add_source(File::from_str(toml, config::FileFormat::Toml))
        .build()
        .map_err(|e| TraderError::Configuration(e.to_string()))?
        .try_deserialize()
        .map_err(|e| TraderError::Configuration(e.to_string()))?;

    config.risk.validate()?;
    Ok(config)
}
