//! Port Reclaimer
//!
//! Frees a TCP port by terminating whatever holds it: graceful signal,
//! bounded wait, then a forceful kill. The orchestrator's own process is
//! never a candidate.

mod sockets;

pub use sockets::SocketOwner;

use std::time::Duration;

use hb_core::error::PortConflictError;
use hb_core::process;
use serde::Serialize;

/// Occupants that reappear (supervised elsewhere) get this many rounds
const MAX_ROUNDS: usize = 3;

/// Result of reclaiming one port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ReclaimOutcome {
    /// One or more processes were terminated
    Freed { pids: Vec<u32> },
    /// Nothing to reclaim
    AlreadyFree,
    /// The port could not be freed
    Failed { reason: String },
}

impl ReclaimOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ReclaimOutcome::Failed { .. })
    }
}

/// Frees ports before services bind them
#[derive(Debug, Clone)]
pub struct PortReclaimer {
    grace: Duration,
    self_pid: u32,
}

impl PortReclaimer {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            self_pid: std::process::id(),
        }
    }

    /// Reclaim `port`. Calling it on a free port is a no-op.
    pub async fn reclaim(&self, port: u16) -> ReclaimOutcome {
        self.reclaim_sparing(port, &[]).await
    }

    /// Reclaim `port` without touching any pid in `spared`.
    ///
    /// The orchestrator passes its own children here so a running service
    /// is never mistaken for a stale occupant of its own port.
    pub async fn reclaim_sparing(&self, port: u16, spared: &[u32]) -> ReclaimOutcome {
        let mut freed = Vec::new();

        for round in 0..MAX_ROUNDS {
            let owners = match enumerate(port).await {
                Ok(owners) => owners,
                Err(reason) => return ReclaimOutcome::Failed { reason },
            };

            let held_by_self = owners.iter().any(|o| o.pid == self.self_pid);
            let targets: Vec<SocketOwner> = owners
                .into_iter()
                .filter(|o| o.pid != self.self_pid && !spared.contains(&o.pid))
                .collect();

            if targets.is_empty() {
                if held_by_self && freed.is_empty() {
                    return ReclaimOutcome::Failed {
                        reason: format!("port {} is held by this process", port),
                    };
                }
                return if freed.is_empty() {
                    ReclaimOutcome::AlreadyFree
                } else {
                    ReclaimOutcome::Freed { pids: freed }
                };
            }

            if round > 0 {
                tracing::debug!(port, round, "Port re-occupied after termination");
            }

            for owner in targets {
                match process::terminate_gracefully(owner.pid, self.grace).await {
                    Ok(process::Termination::NotRunning) => {}
                    Ok(termination) => {
                        tracing::warn!(
                            target: "harbor::audit",
                            pid = owner.pid,
                            process = owner.name.as_deref().unwrap_or("unknown"),
                            port,
                            forced = termination == process::Termination::Forced,
                            "Terminated process holding port"
                        );
                        if !freed.contains(&owner.pid) {
                            freed.push(owner.pid);
                        }
                    }
                    Err(e) => {
                        return ReclaimOutcome::Failed {
                            reason: format!("could not terminate pid {}: {}", owner.pid, e),
                        };
                    }
                }
            }
        }

        ReclaimOutcome::Failed {
            reason: format!(
                "port {} still occupied after {} termination rounds",
                port, MAX_ROUNDS
            ),
        }
    }

    /// Reclaim every port, escalating the first failure to a fatal error
    pub async fn reclaim_all(
        &self,
        ports: &[u16],
        spared: &[u32],
    ) -> Result<Vec<(u16, ReclaimOutcome)>, PortConflictError> {
        let mut outcomes = Vec::with_capacity(ports.len());
        for &port in ports {
            let outcome = self.reclaim_sparing(port, spared).await;
            match &outcome {
                ReclaimOutcome::Failed { reason } => {
                    return Err(PortConflictError::Unrecoverable {
                        port,
                        reason: reason.clone(),
                    });
                }
                ReclaimOutcome::Freed { pids } => {
                    tracing::info!(port, ?pids, "Reclaimed port");
                }
                ReclaimOutcome::AlreadyFree => {
                    tracing::debug!(port, "Port already free");
                }
            }
            outcomes.push((port, outcome));
        }
        Ok(outcomes)
    }
}

async fn enumerate(port: u16) -> Result<Vec<SocketOwner>, String> {
    match tokio::task::spawn_blocking(move || sockets::port_owners(port)).await {
        Ok(Ok(owners)) => Ok(owners),
        Ok(Err(e)) => Err(
            PortConflictError::Enumerate {
                port,
                reason: e.to_string(),
            }
            .to_string(),
        ),
        Err(e) => Err(format!("port enumeration task failed: {}", e)),
    }
}
