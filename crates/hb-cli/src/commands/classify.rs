//! Classify command implementation

use std::path::Path;

use anyhow::{Context, Result};

use crate::ipc::HarborClient;
use hb_core::config::load_config;
use hb_orchestrator::policy::RuleSet;

/// Classify a destination.
///
/// Locally against the configured rule set, or through the running
/// orchestrator's live rule set with `via_daemon`.
pub async fn classify_command(config_path: &Path, destination: &str, via_daemon: bool) -> Result<()> {
    if via_daemon {
        let mut client = HarborClient::new(super::ipc_address(config_path));
        let verdict = client.classify(destination).await?;
        println!("{} -> {}", destination, verdict);
        return Ok(());
    }

    let config = load_config(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    let rules = RuleSet::compile(&config.policy)?;
    let decision = rules.classify(destination);
    match decision.rule {
        Some(rule) => println!(
            "{} -> {} (rule '{}')",
            destination, decision.verdict, rule.pattern
        ),
        None => println!("{} -> {}", destination, decision.verdict),
    }
    Ok(())
}
