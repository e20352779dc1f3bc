//! Reaction that reconfigures services when a watched file changes

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;
use hb_core::config::load_config;
use hb_core::error::WatcherReactionError;
use hb_core::types::LifecycleState;

use super::{FileChange, Reaction};
use crate::policy::PolicyMatcher;
use crate::supervisor::Orchestrator;

/// Reloads configuration and/or restarts services.
///
/// Services owed a restart are remembered until the restart succeeds, so a
/// retried reaction still restarts a service whose spec was already swapped.
pub struct ServiceReaction {
    orchestrator: Orchestrator,
    policy: Arc<PolicyMatcher>,
    config_path: Option<PathBuf>,
    reload_config: bool,
    restart: Vec<String>,
    owed: DashSet<String>,
}

impl ServiceReaction {
    pub fn new(
        orchestrator: Orchestrator,
        policy: Arc<PolicyMatcher>,
        config_path: Option<PathBuf>,
        reload_config: bool,
        restart: Vec<String>,
    ) -> Self {
        Self {
            orchestrator,
            policy,
            config_path,
            reload_config,
            restart,
            owed: DashSet::new(),
        }
    }

    fn reload(&self, change: &FileChange) -> Result<(), WatcherReactionError> {
        let path = self.config_path.as_ref().ok_or_else(|| {
            WatcherReactionError::new(&change.path, "no configuration file to reload")
        })?;
        let config = load_config(path)
            .map_err(|e| WatcherReactionError::new(&change.path, e.to_string()))?;

        self.policy
            .reload(&config.policy)
            .map_err(|e| WatcherReactionError::new(&change.path, e.to_string()))?;

        let changed = self
            .orchestrator
            .apply_config(config)
            .map_err(|e| WatcherReactionError::new(&change.path, e.to_string()))?;
        if !changed.is_empty() {
            tracing::info!(?changed, "Service definitions changed");
        }
        for name in changed {
            self.owed.insert(name);
        }
        Ok(())
    }
}

#[async_trait]
impl Reaction for ServiceReaction {
    async fn react(&self, change: &FileChange) -> Result<(), WatcherReactionError> {
        if self.reload_config {
            self.reload(change)?;
        }
        for name in &self.restart {
            self.owed.insert(name.clone());
        }

        let order = self.orchestrator.start_order();
        let mut owed: Vec<String> = self.owed.iter().map(|n| n.key().clone()).collect();
        owed.sort_by_key(|name| order.iter().position(|n| n == name));

        for name in owed {
            // Services that never started pick up the new spec on their next start
            let state = self.orchestrator.snapshot(&name).map(|s| s.state);
            if matches!(
                state,
                None | Some(LifecycleState::Pending | LifecycleState::Stopped)
            ) {
                self.owed.remove(&name);
                continue;
            }

            self.orchestrator
                .restart(&name)
                .await
                .map_err(|e| WatcherReactionError::new(&change.path, e.to_string()))?;
            self.owed.remove(&name);
        }
        Ok(())
    }
}
