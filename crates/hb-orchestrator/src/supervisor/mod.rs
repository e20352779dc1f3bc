//! Service Orchestrator
//!
//! Each service moves through
//! `Pending -> Starting -> HealthChecking -> Running <-> Degraded`, with
//! `Failed` reachable once launch retries are exhausted and
//! `Stopping -> Stopped` on shutdown. Every transition of a service happens
//! while holding that service's process lock, so at most one transition is
//! in flight per service. Probes run without the lock.

mod backoff;
mod child;
mod prober;
mod table;

pub use backoff::ExponentialBackoff;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::{ArcSwap, ArcSwapOption};
use hb_core::config::{HarborConfig, ServiceSpec};
use hb_core::error::{ConfigError, HarborError, HealthCheckFailure, ServiceError};
use hb_core::traits::HealthProbe;
use hb_core::types::{LifecycleState, ServiceSnapshot};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::reclaim::PortReclaimer;
use child::ServiceProcess;
use table::ServiceTable;

/// Dependency-ordered supervisor for every configured service.
///
/// Cheap to clone; clones share the same services.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    config: ArcSwap<HarborConfig>,
    /// Dependencies before dependents; recomputed on reload
    order: ArcSwap<Vec<String>>,
    slots: HashMap<String, Arc<ServiceSlot>>,
    table: ServiceTable,
    probe: Arc<dyn HealthProbe>,
    reclaimer: PortReclaimer,
    /// Cancelled by `stop_all`, then replaced with a fresh token
    shutdown: ArcSwap<CancellationToken>,
}

struct ServiceSlot {
    name: String,
    spec: ArcSwap<ServiceSpec>,
    /// Only the orchestrator ever signals this process
    process: Mutex<Option<ServiceProcess>>,
    /// Cancels the in-flight launch and the prober of the current run
    run: ArcSwapOption<CancellationToken>,
}

enum AttemptError {
    Failed(String),
    Cancelled,
}

impl Orchestrator {
    /// Build an orchestrator for a configuration.
    ///
    /// The configuration is validated again, so a cyclic or otherwise
    /// invalid document never gets as far as spawning anything.
    pub fn new(config: HarborConfig, probe: Arc<dyn HealthProbe>) -> Result<Self, ConfigError> {
        let order = config.validate()?;

        let table = ServiceTable::default();
        let mut slots = HashMap::new();
        for spec in &config.services {
            table.insert(&spec.name, spec.port);
            slots.insert(
                spec.name.clone(),
                Arc::new(ServiceSlot {
                    name: spec.name.clone(),
                    spec: ArcSwap::from_pointee(spec.clone()),
                    process: Mutex::new(None),
                    run: ArcSwapOption::empty(),
                }),
            );
        }

        let reclaimer = PortReclaimer::new(config.shutdown.grace_period);
        Ok(Self {
            inner: Arc::new(Inner {
                config: ArcSwap::from_pointee(config),
                order: ArcSwap::from_pointee(order),
                slots,
                table,
                probe,
                reclaimer,
                shutdown: ArcSwap::from_pointee(CancellationToken::new()),
            }),
        })
    }

    /// Reclaim ports, then start every service in dependency order.
    ///
    /// A service whose dependencies are not running stays `Pending`. The
    /// first non-optional service to reach `Failed` aborts the sequence;
    /// services already started are left running.
    pub async fn start_all(&self) -> Result<(), HarborError> {
        let inner = &self.inner;
        let config = inner.config.load_full();
        let shutdown = inner.shutdown.load_full();

        let to_start: Vec<Arc<ServiceSlot>> = inner
            .order
            .load()
            .iter()
            .filter_map(|name| inner.slots.get(name))
            .filter(|slot| {
                !inner
                    .table
                    .state(&slot.name)
                    .map(LifecycleState::is_active)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        if config.cleanup_on_startup {
            // Ports of services that are already up belong to our own children
            let active: Vec<u16> = inner
                .slots
                .values()
                .filter(|slot| !to_start.iter().any(|s| Arc::ptr_eq(s, slot)))
                .map(|slot| slot.spec.load().port)
                .collect();
            let ports = config.reclaim_ports_except(&active);
            inner
                .reclaimer
                .reclaim_all(&ports, &inner.child_pids())
                .await?;
        }

        tracing::info!(services = to_start.len(), "Starting services");
        for slot in to_start {
            if shutdown.is_cancelled() {
                return Err(ServiceError::Cancelled(slot.name.clone()).into());
            }

            let spec = slot.spec.load_full();
            if let Some(dependency) = spec.depends_on.iter().find(|d| !inner.is_up(d)) {
                tracing::warn!(
                    service = %slot.name,
                    dependency = %dependency,
                    "Not starting: dependency is not running"
                );
                let waiting = format!("waiting for dependency '{}'", dependency);
                inner.table.update(&slot.name, |r| r.last_error = Some(waiting));
                continue;
            }

            match inner.start_slot(&slot).await {
                Ok(()) => {}
                Err(e @ ServiceError::Failed { .. }) if spec.optional => {
                    tracing::warn!(service = %slot.name, "Optional service failed: {}", e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Stop every service, dependents before their dependencies.
    ///
    /// In-flight launches and probes observe the shutdown immediately.
    pub async fn stop_all(&self) {
        let inner = &self.inner;
        inner.shutdown.load().cancel();

        let order = inner.order.load_full();
        for name in order.iter().rev() {
            if let Some(slot) = inner.slots.get(name) {
                inner.stop_slot(slot).await;
            }
        }

        inner.shutdown.store(Arc::new(CancellationToken::new()));
        tracing::info!("All services stopped");
    }

    /// Stop and relaunch one service with a fresh retry budget
    pub async fn restart(&self, name: &str) -> Result<(), ServiceError> {
        let inner = &self.inner;
        let slot = inner
            .slots
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(name.to_string()))?;

        let spec = slot.spec.load_full();
        if let Some(dependency) = spec.depends_on.iter().find(|d| !inner.is_up(d)) {
            return Err(ServiceError::DependencyNotRunning {
                name: name.to_string(),
                dependency: dependency.clone(),
            });
        }

        inner.stop_slot(&slot).await;

        let config = inner.config.load_full();
        if config.cleanup_on_startup {
            let outcome = inner
                .reclaimer
                .reclaim_sparing(spec.port, &inner.child_pids())
                .await;
            if outcome.is_failed() {
                tracing::warn!(service = name, ?outcome, "Port not reclaimed before restart");
            }
        }

        tracing::info!(service = name, "Restarting service");
        inner.start_slot(&slot).await
    }

    /// Snapshot of every service record
    pub fn status(&self) -> BTreeMap<String, ServiceSnapshot> {
        self.inner.table.snapshot()
    }

    /// Snapshots in start order
    pub fn snapshots(&self) -> Vec<ServiceSnapshot> {
        self.inner
            .order
            .load()
            .iter()
            .filter_map(|name| self.inner.table.get(name))
            .collect()
    }

    pub fn snapshot(&self, name: &str) -> Option<ServiceSnapshot> {
        self.inner.table.get(name)
    }

    pub fn start_order(&self) -> Arc<Vec<String>> {
        self.inner.order.load_full()
    }

    /// Configuration currently in effect
    pub fn config(&self) -> Arc<HarborConfig> {
        self.inner.config.load_full()
    }

    /// Pids of every process the orchestrator currently owns
    pub fn child_pids(&self) -> Vec<u32> {
        self.inner.child_pids()
    }

    /// Swap in a reloaded configuration; returns services whose spec changed.
    ///
    /// The start order is recomputed from the new dependency graph. Changed
    /// services are not restarted here. Services added to or removed from
    /// the document only take effect after an orchestrator restart; removed
    /// ones are kept at the front of the order so they are stopped last.
    pub fn apply_config(&self, config: HarborConfig) -> Result<Vec<String>, ConfigError> {
        let inner = &self.inner;
        let new_order = config.validate()?;
        let env_changed = inner.config.load().environment != config.environment;

        let mut changed = Vec::new();
        for spec in &config.services {
            match inner.slots.get(&spec.name) {
                Some(slot) => {
                    if env_changed || **slot.spec.load() != *spec {
                        slot.spec.store(Arc::new(spec.clone()));
                        changed.push(spec.name.clone());
                    }
                }
                None => {
                    tracing::warn!(service = %spec.name, "New service ignored until restart");
                }
            }
        }
        let old_order = inner.order.load_full();
        let mut order: Vec<String> = Vec::with_capacity(old_order.len());
        for name in old_order.iter() {
            if config.service(name).is_none() {
                tracing::warn!(service = %name, "Removed service keeps running until restart");
                order.push(name.clone());
            }
        }
        order.extend(
            new_order
                .into_iter()
                .filter(|name| inner.slots.contains_key(name)),
        );
        if order != *old_order {
            tracing::info!(?order, "Start order changed");
        }

        inner.order.store(Arc::new(order));
        inner.config.store(Arc::new(config));
        Ok(changed)
    }
}

impl Inner {
    fn is_up(&self, name: &str) -> bool {
        matches!(
            self.table.state(name),
            Some(LifecycleState::Running | LifecycleState::Degraded)
        )
    }

    fn child_pids(&self) -> Vec<u32> {
        self.table
            .snapshot()
            .values()
            .filter_map(|r| r.pid)
            .collect()
    }

    /// New cancellation scope for one run of a service
    fn arm(&self, slot: &ServiceSlot) -> Arc<CancellationToken> {
        let token = Arc::new(self.shutdown.load().child_token());
        slot.run.store(Some(token.clone()));
        token
    }

    async fn start_slot(self: &Arc<Self>, slot: &Arc<ServiceSlot>) -> Result<(), ServiceError> {
        let cancel = self.arm(slot);
        let mut current = slot.process.lock().await;
        self.table.update(&slot.name, |r| {
            r.restart_count = 0;
            r.consecutive_failures = 0;
            r.last_error = None;
        });

        self.launch(slot, &mut current, &cancel).await?;
        drop(current);

        tokio::spawn(prober::run(self.clone(), slot.clone(), cancel));
        Ok(())
    }

    async fn stop_slot(&self, slot: &ServiceSlot) {
        if let Some(token) = slot.run.swap(None) {
            token.cancel();
        }

        let mut current = slot.process.lock().await;
        self.table.transition(&slot.name, LifecycleState::Stopping);
        if let Some(process) = current.take() {
            let grace = self.config.load().shutdown.grace_period;
            process.terminate(grace).await;
        }
        self.table.update(&slot.name, |r| r.pid = None);
        self.table.transition(&slot.name, LifecycleState::Stopped);
    }

    /// Launch attempts with backoff until healthy, exhausted or cancelled.
    ///
    /// Caller holds the slot's process lock.
    async fn launch(
        &self,
        slot: &ServiceSlot,
        current: &mut Option<ServiceProcess>,
        cancel: &CancellationToken,
    ) -> Result<(), ServiceError> {
        let name = slot.name.as_str();
        let config = self.config.load_full();
        let mut backoff = ExponentialBackoff::from_config(&config.backoff);

        loop {
            if cancel.is_cancelled() {
                return Err(ServiceError::Cancelled(name.to_string()));
            }
            let spec = slot.spec.load_full();
            self.table.transition(name, LifecycleState::Starting);

            let reason = match self.attempt(&spec, &config, current, cancel).await {
                Ok(()) => {
                    self.table.update(name, |r| r.last_error = None);
                    self.table.transition(name, LifecycleState::Running);
                    return Ok(());
                }
                Err(AttemptError::Cancelled) => {
                    if let Some(process) = current.take() {
                        process.kill().await;
                    }
                    self.table.update(name, |r| r.pid = None);
                    return Err(ServiceError::Cancelled(name.to_string()));
                }
                Err(AttemptError::Failed(reason)) => reason,
            };

            if let Some(process) = current.take() {
                process.kill().await;
            }
            // restart_count only moves when another launch actually follows
            let mut restarts = 0;
            let mut exhausted = false;
            self.table.update(name, |r| {
                r.pid = None;
                r.last_error = Some(reason.clone());
                exhausted = r.restart_count >= spec.max_restart_attempts;
                if !exhausted {
                    r.restart_count += 1;
                }
                restarts = r.restart_count;
            });
            tracing::warn!(service = name, restarts, "Launch attempt failed: {}", reason);

            if exhausted {
                self.table.transition(name, LifecycleState::Failed);
                return Err(ServiceError::Failed {
                    name: name.to_string(),
                    reason: format!("{} (gave up after {} restarts)", reason, restarts),
                });
            }

            let delay = backoff.next_delay();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return Err(ServiceError::Cancelled(name.to_string()));
                }
            }
        }
    }

    /// One launch: spawn, wait for liveness, poll health until the startup
    /// timeout.
    async fn attempt(
        &self,
        spec: &ServiceSpec,
        config: &HarborConfig,
        current: &mut Option<ServiceProcess>,
        cancel: &CancellationToken,
    ) -> Result<(), AttemptError> {
        let name = spec.name.as_str();
        let env = config.environment_for(spec);
        let process = ServiceProcess::spawn(spec, &env).map_err(|e| {
            AttemptError::Failed(
                ServiceError::Launch {
                    name: name.to_string(),
                    reason: e.to_string(),
                }
                .to_string(),
            )
        })?;
        let pid = process.pid();
        let process = current.insert(process);
        self.table.update(name, |r| r.pid = Some(pid));
        tracing::debug!(service = name, pid, "Process launched");

        if let Some(status) = process.exited() {
            return Err(AttemptError::Failed(format!("process exited immediately: {}", status)));
        }
        self.table.transition(name, LifecycleState::HealthChecking);

        let poll = config.probe.startup_poll;
        let deadline = Instant::now() + spec.startup_timeout;
        loop {
            if let Some(status) = process.exited() {
                return Err(health_failure(name, HealthCheckFailure::Exited(status)));
            }

            let probed = tokio::select! {
                r = tokio::time::timeout_at(deadline.into(), self.probe.probe(spec)) => r,
                _ = cancel.cancelled() => return Err(AttemptError::Cancelled),
            };
            let failure = match probed {
                Ok(Ok(())) => {
                    self.table.record_health(name, true, None);
                    return Ok(());
                }
                Ok(Err(failure)) => failure,
                Err(_) => HealthCheckFailure::Timeout,
            };

            if Instant::now() + poll >= deadline {
                return Err(health_failure(name, failure));
            }
            tokio::select! {
                _ = tokio::time::sleep(poll) => {}
                _ = cancel.cancelled() => return Err(AttemptError::Cancelled),
            }
        }
    }
}

fn health_failure(name: &str, failure: HealthCheckFailure) -> AttemptError {
    AttemptError::Failed(
        ServiceError::HealthCheck {
            name: name.to_string(),
            failure,
        }
        .to_string(),
    )
}
