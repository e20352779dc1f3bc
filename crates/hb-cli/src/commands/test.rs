//! Test command implementation

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::output::{format_report, print_error, print_info, print_success, print_warning};
use hb_core::config::load_config;
use hb_orchestrator::harness::{builtin_scenarios, Harness, HarnessContext};
use hb_orchestrator::HarborState;

/// Run the built-in scenarios against the configured services.
///
/// Returns whether the overall result was `PASS`.
pub async fn test_command(config_path: &Path, report_path: Option<PathBuf>) -> Result<bool> {
    let config = load_config(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    let timeout = config.harness.scenario_timeout;
    let report_path = report_path.unwrap_or_else(|| config.harness.report_path.clone());

    let state = Arc::new(HarborState::new(config)?);
    let ctx = HarnessContext {
        state: Arc::clone(&state),
        occupant: occupant_command(),
    };
    let harness = Harness::new(ctx, timeout).with_scenarios(builtin_scenarios());

    print_info(&format!(
        "Running {} scenarios against {}",
        builtin_scenarios().len(),
        config_path.display()
    ));

    let report = tokio::select! {
        report = harness.run("harbor") => report,
        _ = tokio::signal::ctrl_c() => {
            state.orchestrator.stop_all().await;
            anyhow::bail!("Test run interrupted");
        }
    };
    state.orchestrator.stop_all().await;

    println!("{}", format_report(&report));
    report
        .write(&report_path)
        .with_context(|| format!("Failed to write report to {}", report_path.display()))?;
    print_info(&format!("Report written to {}", report_path.display()));

    if report.is_pass() {
        print_success("All scenarios passed");
    } else {
        let failing: Vec<&str> = report
            .results
            .iter()
            .filter(|r| !r.passed())
            .map(|r| r.name.as_str())
            .collect();
        print_error(&format!(
            "{}: failing scenarios: {}",
            report.overall,
            failing.join(", ")
        ));
    }
    Ok(report.is_pass())
}

/// This binary's own stub service, used as a foreign port occupant
fn occupant_command() -> Option<Vec<String>> {
    match std::env::current_exe() {
        Ok(exe) => Some(vec![
            exe.display().to_string(),
            "stub-service".to_string(),
            "--port".to_string(),
            "{port}".to_string(),
        ]),
        Err(e) => {
            print_warning(&format!("Cannot locate own executable ({}); port conflicts will not be simulated", e));
            None
        }
    }
}
