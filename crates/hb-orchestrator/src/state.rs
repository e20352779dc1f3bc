//! Shared state of a running harbor daemon

use std::sync::Arc;
use std::time::Instant;

use hb_core::config::HarborConfig;
use hb_core::error::ConfigError;
use hb_core::ipc::DaemonStatus;
use hb_core::traits::HealthProbe;
use tokio_util::sync::CancellationToken;

use crate::health::HttpProbe;
use crate::policy::PolicyMatcher;
use crate::supervisor::Orchestrator;
use crate::watcher::{ConfigWatcher, ServiceReaction};

/// Everything the IPC server, watchers and CLI share
pub struct HarborState {
    pub orchestrator: Orchestrator,
    pub policy: Arc<PolicyMatcher>,
    /// Cancelled when the daemon should exit (signal or IPC `shutdown`)
    pub shutdown: CancellationToken,
    started_at: Instant,
}

impl HarborState {
    /// Build state from a validated configuration with the HTTP probe
    pub fn new(config: HarborConfig) -> Result<Self, ConfigError> {
        Self::with_probe(config, Arc::new(HttpProbe::new()))
    }

    /// Build state with a custom health probe
    pub fn with_probe(
        config: HarborConfig,
        probe: Arc<dyn HealthProbe>,
    ) -> Result<Self, ConfigError> {
        let policy = PolicyMatcher::from_config(&config.policy)?;
        let orchestrator = Orchestrator::new(config, probe)?;
        Ok(Self {
            orchestrator,
            policy: Arc::new(policy),
            shutdown: CancellationToken::new(),
            started_at: Instant::now(),
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn daemon_status(&self) -> DaemonStatus {
        DaemonStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            pid: std::process::id(),
            uptime_secs: self.uptime_secs(),
            config_path: self
                .orchestrator
                .config()
                .source
                .as_ref()
                .map(|p| p.display().to_string()),
            services: self.orchestrator.snapshots(),
        }
    }

    /// Start polling every configured watcher
    pub fn spawn_watchers(&self) -> ConfigWatcher {
        let config = self.orchestrator.config();
        let mut watcher = ConfigWatcher::new(self.shutdown.child_token());
        for entry in &config.watchers {
            let reaction = ServiceReaction::new(
                self.orchestrator.clone(),
                self.policy.clone(),
                config.source.clone(),
                entry.reload_config,
                entry.restart.clone(),
            );
            watcher.watch(&entry.path, entry.poll_interval, Arc::new(reaction));
        }
        watcher
    }
}
