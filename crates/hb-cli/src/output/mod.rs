//! Output formatting utilities for the CLI
//!
//! Tables for service snapshots and test reports, the daemon status header,
//! and colored status messages.

use tabled::{
    settings::{Style, Width},
    Table, Tabled,
};

use hb_core::ipc::DaemonStatus;
use hb_core::time::{elapsed_millis, format_millis};
use hb_core::types::ServiceSnapshot;
use hb_orchestrator::harness::TestReport;

/// Format service snapshots as a table
///
/// Returns "No services configured" for an empty list.
pub fn format_services(services: &[ServiceSnapshot]) -> String {
    if services.is_empty() {
        return "No services configured".to_string();
    }

    #[derive(Tabled)]
    struct ServiceRow {
        #[tabled(rename = "SERVICE")]
        name: String,
        #[tabled(rename = "STATE")]
        state: String,
        #[tabled(rename = "PORT")]
        port: u16,
        #[tabled(rename = "PID")]
        pid: String,
        #[tabled(rename = "RESTARTS")]
        restarts: u32,
        #[tabled(rename = "SINCE")]
        since: String,
        #[tabled(rename = "LAST ERROR")]
        error: String,
    }

    let rows: Vec<ServiceRow> = services
        .iter()
        .map(|s| ServiceRow {
            name: s.name.clone(),
            state: s.state.to_string(),
            port: s.port,
            pid: s
                .pid
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
            restarts: s.restart_count,
            since: format!("{} ago", format_millis(elapsed_millis(s.since))),
            error: s
                .last_error
                .as_deref()
                .map(|e| truncate(e, 48))
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    Table::new(rows)
        .with(Style::rounded())
        .with(Width::wrap(120))
        .to_string()
}

/// Format daemon status: header lines followed by the service table
pub fn format_status(status: &DaemonStatus) -> String {
    let mut output = String::new();

    output.push_str(&format!("Orchestrator: running (PID {})\n", status.pid));
    output.push_str(&format!("Version: {}\n", status.version));
    output.push_str(&format!(
        "Uptime: {}\n",
        format_millis(status.uptime_secs.saturating_mul(1000))
    ));
    if let Some(path) = &status.config_path {
        output.push_str(&format!("Config: {}\n", path));
    }
    output.push('\n');
    output.push_str(&format_services(&status.services));

    output
}

/// Format a harness report as a table with a summary line
pub fn format_report(report: &TestReport) -> String {
    #[derive(Tabled)]
    struct ResultRow {
        #[tabled(rename = "SCENARIO")]
        name: String,
        #[tabled(rename = "RESULT")]
        status: String,
        #[tabled(rename = "TIME")]
        duration: String,
        #[tabled(rename = "DETAIL")]
        detail: String,
    }

    let rows: Vec<ResultRow> = report
        .results
        .iter()
        .map(|r| ResultRow {
            name: r.name.clone(),
            status: if r.passed() { "pass" } else { "FAIL" }.to_string(),
            duration: format_millis(r.duration_ms),
            detail: r.detail.clone(),
        })
        .collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Width::wrap(120))
        .to_string();

    format!(
        "{}\n{}: {} passed, {} failed",
        table, report.overall, report.passed, report.failed
    )
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
