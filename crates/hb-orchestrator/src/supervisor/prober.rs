//! Background health prober, one task per running service

use std::sync::Arc;

use hb_core::error::HealthCheckFailure;
use hb_core::types::LifecycleState;
use tokio_util::sync::CancellationToken;

use super::{Inner, ServiceSlot};

/// Probe on a fixed interval while the service is `Running` or `Degraded`.
///
/// After `failureThreshold` consecutive failures the service is `Failed`
/// and relaunched in place, unless its restart budget is spent.
pub(super) async fn run(inner: Arc<Inner>, slot: Arc<ServiceSlot>, cancel: Arc<CancellationToken>) {
    let name = slot.name.as_str();
    tracing::debug!(service = name, "Health prober started");

    loop {
        let probe_config = inner.config.load().probe.clone();
        tokio::select! {
            _ = tokio::time::sleep(probe_config.interval) => {}
            _ = cancel.cancelled() => break,
        }

        let spec = slot.spec.load_full();
        let probed = tokio::select! {
            r = inner.probe.probe(&spec) => r,
            _ = cancel.cancelled() => break,
        };

        let mut current = tokio::select! {
            guard = slot.process.lock() => guard,
            _ = cancel.cancelled() => break,
        };
        if cancel.is_cancelled() {
            break;
        }

        let exited = current.as_mut().and_then(|p| p.exited());
        let result = match exited {
            Some(status) => Err(HealthCheckFailure::Exited(status)),
            None if current.is_none() => Err(HealthCheckFailure::Exited("no process".into())),
            None => probed,
        };

        match result {
            Ok(()) => {
                inner.table.record_health(name, true, None);
                if inner.table.state(name) == Some(LifecycleState::Degraded) {
                    tracing::info!(service = name, "Service recovered");
                    inner.table.transition(name, LifecycleState::Running);
                }
                continue;
            }
            Err(failure) => {
                let failures = inner.table.record_health(name, false, Some(failure.to_string()));
                tracing::warn!(service = name, failures, "Health probe failed: {}", failure);
                if inner.table.state(name) == Some(LifecycleState::Running) {
                    inner.table.transition(name, LifecycleState::Degraded);
                }
                if failures < probe_config.failure_threshold {
                    continue;
                }
            }
        }

        inner.table.transition(name, LifecycleState::Failed);
        let restarts = inner.table.get(name).map(|r| r.restart_count).unwrap_or(0);
        if restarts >= spec.max_restart_attempts {
            tracing::error!(service = name, restarts, "Restart attempts exhausted");
            if let Some(process) = current.take() {
                process.kill().await;
            }
            inner.table.update(name, |r| r.pid = None);
            break;
        }

        tracing::warn!(service = name, "Restarting unhealthy service");
        if let Some(process) = current.take() {
            let grace = inner.config.load().shutdown.grace_period;
            process.terminate(grace).await;
        }
        inner.table.update(name, |r| {
            r.pid = None;
            r.restart_count += 1;
            r.consecutive_failures = 0;
        });
        if let Err(e) = inner.launch(&slot, &mut current, &cancel).await {
            tracing::error!(service = name, "Automatic restart failed: {}", e);
            break;
        }
    }

    tracing::debug!(service = name, "Health prober stopped");
}
