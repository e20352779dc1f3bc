//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a managed service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleState {
    /// Waiting for dependencies (or never started)
    Pending,
    /// Process is being launched
    Starting,
    /// Process is alive, waiting for the first healthy probe
    HealthChecking,
    /// Healthy and serving
    Running,
    /// Running, but the last probe failed
    Degraded,
    /// Shutdown requested
    Stopping,
    /// Process terminated after a shutdown request
    Stopped,
    /// Restart attempts exhausted
    Failed,
}

impl LifecycleState {
    /// Whether a process is expected to exist in this state
    pub fn is_active(self) -> bool {
        matches!(
            self,
            LifecycleState::Starting
                | LifecycleState::HealthChecking
                | LifecycleState::Running
                | LifecycleState::Degraded
        )
    }

    /// Whether the background prober should be watching this service
    pub fn is_probed(self) -> bool {
        matches!(self, LifecycleState::Running | LifecycleState::Degraded)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Pending => write!(f, "pending"),
            LifecycleState::Starting => write!(f, "starting"),
            LifecycleState::HealthChecking => write!(f, "health-checking"),
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Degraded => write!(f, "degraded"),
            LifecycleState::Stopping => write!(f, "stopping"),
            LifecycleState::Stopped => write!(f, "stopped"),
            LifecycleState::Failed => write!(f, "failed"),
        }
    }
}

/// Result of the most recent health probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub healthy: bool,
    pub detail: Option<String>,
    /// Unix milliseconds
    pub checked_at: u64,
}

/// Point-in-time copy of a service's runtime record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSnapshot {
    pub name: String,
    pub state: LifecycleState,
    pub port: u16,
    pub pid: Option<u32>,
    pub last_health: Option<HealthRecord>,
    pub restart_count: u32,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    /// Unix milliseconds of the last transition
    pub since: u64,
}

impl ServiceSnapshot {
    /// Fresh record for a service that has not been started
    pub fn pending(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            state: LifecycleState::Pending,
            port,
            pid: None,
            last_health: None,
            restart_count: 0,
            consecutive_failures: 0,
            last_error: None,
            since: crate::time::current_time_millis(),
        }
    }
}

/// Outcome of classifying an outbound destination
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Verdict {
    /// Connection may proceed
    Allow,
    /// Connection must be refused
    Block,
    /// Connect to this local substitute instead
    RedirectTo { host: String, port: u16 },
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Allow => write!(f, "allow"),
            Verdict::Block => write!(f, "block"),
            Verdict::RedirectTo { host, port } => write!(f, "redirect -> {}:{}", host, port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_display() {
        assert_eq!(LifecycleState::HealthChecking.to_string(), "health-checking");
        assert_eq!(LifecycleState::Failed.to_string(), "failed");
    }

    #[test]
    fn test_active_and_probed_states() {
        assert!(LifecycleState::Starting.is_active());
        assert!(!LifecycleState::Starting.is_probed());
        assert!(LifecycleState::Degraded.is_probed());
        assert!(!LifecycleState::Stopped.is_active());
        assert!(!LifecycleState::Failed.is_active());
    }

    #[test]
    fn test_verdict_serializes_with_action_tag() {
        let json = serde_json::to_string(&Verdict::RedirectTo {
            host: "127.0.0.1".into(),
            port: 11434,
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"action":"redirectTo","host":"127.0.0.1","port":11434}"#
        );
    }
}
