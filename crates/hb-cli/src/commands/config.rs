//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_info, print_success, print_warning};
use hb_core::config::{self, HarborConfig};

/// The `--config` path, or the default location
pub fn resolve_config_path(config_path: Option<&PathBuf>) -> PathBuf {
    config_path
        .cloned()
        .unwrap_or_else(config::default_config_path)
}

/// Print the config file location
pub fn config_path(path: &Path) {
    println!("{}", path.display());
}

/// Print the effective configuration (defaults filled in) as JSON
pub fn config_show(path: &Path) -> Result<()> {
    let config = config::load_config(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Validate the config file and print the start order
pub fn config_check(path: &Path) -> Result<()> {
    let config = config::load_config(path)
        .with_context(|| format!("Invalid config {}", path.display()))?;
    let order = config.start_order()?;

    print_success(&format!("{} is valid", path.display()));
    println!("  Services:    {}", config.services.len());
    println!("  Start order: {}", order.join(" -> "));
    println!("  Ports:       {}", join_ports(&config.reclaim_ports()));
    println!(
        "  Policy:      {} allowlisted, {} rules",
        config.policy.allowlist.len(),
        config.policy.rules.len()
    );
    println!("  Watchers:    {}", config.watchers.len());
    Ok(())
}

/// Write a sample configuration
pub fn config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        print_warning(&format!("Config file already exists: {}", path.display()));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    config::save_config(path, &HarborConfig::sample())
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    print_success(&format!("Created {}", path.display()));
    Ok(())
}

fn join_ports(ports: &[u16]) -> String {
    ports
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
