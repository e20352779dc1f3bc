//! Stop command implementation
//!
//! Asks the orchestrator to shut down over IPC. When IPC is unreachable the
//! PID file is the fallback: a live PID gets a graceful termination.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::ipc::HarborClient;
use crate::output::{print_info, print_success, print_warning};
use hb_core::pidfile;
use hb_core::process::{self, Termination};

/// How long `stop` waits for the orchestrator to exit after asking
const STOP_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn stop_command(client: &mut HarborClient, pid_path: &Path) -> Result<()> {
    print_info("Stopping orchestrator...");

    match client.shutdown().await {
        Ok(()) => {
            // The daemon removes its PID file on exit; wait for that
            if let Some(pid) = pidfile::read_pid_file(pid_path).ok().flatten() {
                if !process::wait_for_exit(pid, STOP_TIMEOUT).await {
                    print_warning(&format!(
                        "Orchestrator (PID {}) is still shutting down",
                        pid
                    ));
                    return Ok(());
                }
            }
            print_success("Orchestrator stopped");
            return Ok(());
        }
        Err(e) => tracing::debug!("IPC shutdown failed: {:#}", e),
    }

    let pid = pidfile::live_pid(pid_path)
        .with_context(|| format!("Failed to read PID file {}", pid_path.display()))?;
    let Some(pid) = pid else {
        print_warning("Orchestrator is not running");
        return Ok(());
    };

    print_info(&format!(
        "IPC unreachable, terminating PID {} from {}",
        pid,
        pid_path.display()
    ));
    match process::terminate_gracefully(pid, STOP_TIMEOUT).await? {
        Termination::NotRunning => print_warning("Orchestrator is not running"),
        Termination::Graceful => print_success("Orchestrator stopped"),
        Termination::Forced => print_warning("Orchestrator did not exit in time and was killed"),
    }
    // Only a forced kill leaves the file behind
    pidfile::remove_pid_file(pid_path)?;
    Ok(())
}
