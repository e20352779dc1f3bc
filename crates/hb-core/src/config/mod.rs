//! Configuration management for harbor

mod harbor;
mod policy;
pub mod serde_utils;
mod service;
mod validate;

pub use harbor::{
    BackoffConfig, HarborConfig, HarnessConfig, ProbeConfig, ShutdownConfig, WatcherConfig,
    DEFAULT_IPC_PORT,
};
pub use policy::{
    Pattern, PolicyConfig, PolicyRule, PolicyRuleConfig, RuleAction, RuleActionKind,
    DEFAULT_ALLOWLIST,
};
pub use service::{HealthCheckSpec, ServiceSpec, DEFAULT_HEALTH_PATH};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("harbor")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("harbor.json")
}

/// Load and validate configuration from a file.
///
/// `.toml` files are parsed as TOML, everything else as JSON. Relative
/// paths inside the document resolve against the file's directory. Either
/// the whole document is valid or nothing is returned.
pub fn load_config(path: &Path) -> Result<HarborConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);

    let mut config = if is_toml {
        parse_toml(&content)?
    } else {
        parse_json(&content)?
    };

    let base = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    config.resolve_paths(&base);
    config.source = Some(path.to_path_buf());
    config.validate()?;
    Ok(config)
}

/// Parse and validate a JSON document (no path resolution)
pub fn parse_json(content: &str) -> Result<HarborConfig, ConfigError> {
    let config: HarborConfig = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Parse and validate a TOML document (no path resolution)
pub fn parse_toml(content: &str) -> Result<HarborConfig, ConfigError> {
    let config: HarborConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Save configuration to a file as pretty JSON
pub fn save_config(path: &Path, config: &HarborConfig) -> Result<(), ConfigError> {
    let content = serde_json::to_string_pretty(config)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}
