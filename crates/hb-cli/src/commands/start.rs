//! Start command: run the orchestrator in the foreground
//!
//! Order of operations:
//! 1. Load and validate configuration (fatal on error, nothing spawned)
//! 2. Refuse to run if the PID file names a live orchestrator
//! 3. Bind the IPC endpoint
//! 4. `start_all` (reclaim ports, launch in dependency order)
//! 5. Serve until a signal or an IPC `shutdown`, then `stop_all`

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::output::{format_services, print_error, print_success, print_warning};
use hb_core::config::load_config;
use hb_core::error::ServiceError;
use hb_core::pidfile::{self, PidFileGuard};
use hb_core::HarborError;
use hb_orchestrator::ipc::IpcServer;
use hb_orchestrator::HarborState;

pub async fn start_command(config_path: &Path, pid_path: &Path) -> Result<()> {
    let config = load_config(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    if let Some(pid) = pidfile::live_pid(pid_path)? {
        anyhow::bail!(
            "harbor is already running (PID {}, {})",
            pid,
            pid_path.display()
        );
    }
    let _pid_guard = PidFileGuard::new(pid_path.to_path_buf(), std::process::id())
        .with_context(|| format!("Failed to write PID file {}", pid_path.display()))?;

    let ipc_address = config.ipc_address();
    let state = Arc::new(HarborState::new(config)?);
    spawn_signal_handler(state.shutdown.clone());

    let ipc_server = IpcServer::bind(&ipc_address, Arc::clone(&state)).await?;
    let ipc_task = tokio::spawn(ipc_server.run());

    tracing::info!("harbor starting (PID {})", std::process::id());

    let orchestrator = state.orchestrator.clone();
    let mut startup = tokio::spawn(async move { orchestrator.start_all().await });
    let started = tokio::select! {
        joined = &mut startup => Some(joined),
        _ = state.shutdown.cancelled() => None,
    };

    let Some(joined) = started else {
        // Interrupted mid-startup; stop_all cancels the in-flight launch
        state.orchestrator.stop_all().await;
        let _ = startup.await;
        let _ = ipc_task.await;
        print_warning("Startup interrupted");
        return Ok(());
    };

    match joined.context("startup task failed")? {
        Ok(()) => {}
        Err(HarborError::Service(ServiceError::Cancelled(_))) => {}
        Err(HarborError::Service(e)) => {
            // A failed service halts its dependents, not the orchestrator
            print_error(&e.to_string());
        }
        Err(e) => {
            state.orchestrator.stop_all().await;
            state.shutdown.cancel();
            let _ = ipc_task.await;
            return Err(e).context("Startup failed");
        }
    }

    let watcher = state.spawn_watchers();
    println!("{}", format_services(&state.orchestrator.snapshots()));
    print_success(&format!(
        "harbor running: {} services, {} watchers, IPC on {}",
        state.orchestrator.start_order().len(),
        watcher.len(),
        ipc_address
    ));

    state.shutdown.cancelled().await;
    tracing::info!("Shutting down");

    watcher.shutdown().await;
    state.orchestrator.stop_all().await;
    let _ = ipc_task.await;

    print_success("harbor stopped");
    Ok(())
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler, Ctrl+C only: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
            _ = shutdown.cancelled() => return,
        }

        shutdown.cancel();
    });
}
