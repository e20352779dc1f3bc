//! Built-in scenarios, run by `harbor test` in this order

use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hb_core::config::Pattern;
use hb_core::types::{LifecycleState, Verdict};
use tokio::sync::Mutex;

use super::{HarnessContext, Scenario};
use crate::reclaim::ReclaimOutcome;
use crate::watcher::{FileChange, FnReaction, PollOutcome, WatchedFile};

pub const BUILTIN_SCENARIOS: &[&str] = &[
    "port-conflict-resolution",
    "service-startup-sequence",
    "environment-variable-access",
    "policy-enforcement",
    "config-change-reaction",
];

pub fn builtin_scenarios() -> Vec<Arc<dyn Scenario>> {
    vec![
        Arc::new(PortConflictResolution::default()),
        Arc::new(ServiceStartupSequence),
        Arc::new(EnvironmentVariableAccess),
        Arc::new(PolicyEnforcement),
        Arc::new(ConfigChangeReaction::default()),
    ]
}

/// Occupy a free port with a foreign process, reclaim it, and check that a
/// second reclaim is a no-op.
#[derive(Default)]
struct PortConflictResolution {
    occupant: Mutex<Option<u32>>,
}

#[async_trait]
impl Scenario for PortConflictResolution {
    fn name(&self) -> &str {
        "port-conflict-resolution"
    }

    async fn check(&self, ctx: &HarnessContext) -> Result<String, String> {
        let reclaimer = crate::reclaim::PortReclaimer::new(
            ctx.state.orchestrator.config().shutdown.grace_period,
        );

        let Some(template) = ctx.occupant.as_ref().filter(|t| !t.is_empty()) else {
            // Nothing to evict; idempotence on a free port is still checked
            let port = free_port()?;
            return match (reclaimer.reclaim(port).await, reclaimer.reclaim(port).await) {
                (ReclaimOutcome::AlreadyFree, ReclaimOutcome::AlreadyFree) => Ok(format!(
                    "port {} reported free twice (no occupant command configured)",
                    port
                )),
                other => Err(format!("unexpected outcomes on free port {}: {:?}", port, other)),
            };
        };

        let port = free_port()?;
        let args: Vec<String> = template
            .iter()
            .map(|a| a.replace("{port}", &port.to_string()))
            .collect();
        let mut child = tokio::process::Command::new(&args[0])
            .args(&args[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| format!("failed to start occupant: {}", e))?;
        let occupant_pid = child
            .id()
            .ok_or_else(|| "occupant exited immediately".to_string())?;
        *self.occupant.lock().await = Some(occupant_pid);
        // Reap as soon as it exits so it never lingers as a zombie
        tokio::spawn(async move {
            let _ = child.wait().await;
        });

        wait_until_listening(port, Duration::from_secs(10)).await?;

        match reclaimer.reclaim(port).await {
            ReclaimOutcome::Freed { pids } if pids.contains(&occupant_pid) => {}
            other => return Err(format!("expected occupant to be freed, got {:?}", other)),
        }
        for attempt in 0..2 {
            let outcome = reclaimer.reclaim(port).await;
            if outcome != ReclaimOutcome::AlreadyFree {
                return Err(format!("reclaim #{} after eviction returned {:?}", attempt + 2, outcome));
            }
        }
        Ok(format!("occupant of port {} terminated; repeat reclaims were no-ops", port))
    }

    async fn teardown(&self, _ctx: &HarnessContext) {
        if let Some(pid) = self.occupant.lock().await.take() {
            if hb_core::process::is_process_alive(pid) {
                let _ = hb_core::process::force_kill(pid);
            }
        }
    }
}

/// Start everything and verify each service came up after its dependencies
struct ServiceStartupSequence;

#[async_trait]
impl Scenario for ServiceStartupSequence {
    fn name(&self) -> &str {
        "service-startup-sequence"
    }

    async fn check(&self, ctx: &HarnessContext) -> Result<String, String> {
        let orchestrator = &ctx.state.orchestrator;
        let order = orchestrator.start_order().as_ref().clone();
        if order.is_empty() {
            return Ok("no services configured".into());
        }

        if let Err(e) = orchestrator.start_all().await {
            return Err(format!("start failed: {}", e));
        }

        let config = orchestrator.config();
        for name in &order {
            let snapshot = orchestrator
                .snapshot(name)
                .ok_or_else(|| format!("no record for '{}'", name))?;
            let optional = config.service(name).map_or(false, |s| s.optional);
            if !snapshot.state.is_probed() {
                if optional {
                    continue;
                }
                return Err(format!("'{}' is {}", name, snapshot.state));
            }
            if snapshot.pid.is_none() {
                return Err(format!("'{}' is {} without a process", name, snapshot.state));
            }
            for dep in config.service(name).map(|s| s.depends_on.clone()).unwrap_or_default() {
                let dep_since = orchestrator.snapshot(&dep).map(|s| s.since).unwrap_or(u64::MAX);
                if dep_since > snapshot.since {
                    return Err(format!("'{}' became ready before its dependency '{}'", name, dep));
                }
            }
        }
        Ok(format!("started in order: {}", order.join(" -> ")))
    }
}

/// Every required variable reaches every running service
struct EnvironmentVariableAccess;

#[async_trait]
impl Scenario for EnvironmentVariableAccess {
    fn name(&self) -> &str {
        "environment-variable-access"
    }

    async fn check(&self, ctx: &HarnessContext) -> Result<String, String> {
        let config = ctx.state.orchestrator.config();
        let mut required: Vec<String> = config.harness.required_env.clone();
        for key in config.environment.keys() {
            if !required.contains(key) {
                required.push(key.clone());
            }
        }
        if required.is_empty() {
            return Ok("no environment requirements".into());
        }

        let mut checked = 0;
        for spec in &config.services {
            let merged = config.environment_for(spec);
            for var in &required {
                if !merged.contains_key(var) && std::env::var_os(var).is_none() {
                    return Err(format!("'{}' is not provided to service '{}'", var, spec.name));
                }
            }

            #[cfg(target_os = "linux")]
            if let Some(pid) = ctx.state.orchestrator.snapshot(&spec.name).and_then(|s| s.pid) {
                let environ = std::fs::read(format!("/proc/{}/environ", pid))
                    .map_err(|e| format!("cannot read environment of '{}': {}", spec.name, e))?;
                for var in &required {
                    let prefix = format!("{}=", var);
                    let present = environ
                        .split(|b| *b == 0)
                        .any(|entry| entry.starts_with(prefix.as_bytes()));
                    if !present {
                        return Err(format!(
                            "'{}' missing from running process of '{}'",
                            var, spec.name
                        ));
                    }
                }
            }
            checked += 1;
        }
        Ok(format!(
            "{} variable(s) visible to {} service(s): {}",
            required.len(),
            checked,
            required.join(", ")
        ))
    }
}

/// The active rule set allows the allowlist and catches each rule's sample
struct PolicyEnforcement;

#[async_trait]
impl Scenario for PolicyEnforcement {
    fn name(&self) -> &str {
        "policy-enforcement"
    }

    async fn check(&self, ctx: &HarnessContext) -> Result<String, String> {
        let policy = &ctx.state.policy;
        let config = ctx.state.orchestrator.config();

        for entry in &config.policy.allowlist {
            let verdict = policy.classify(entry);
            if verdict != Verdict::Allow {
                return Err(format!("allowlisted '{}' classified as {}", entry, verdict));
            }
        }

        let rules = config.policy.compile().map_err(|e| e.to_string())?;
        let mut intercepted = 0;
        for rule in &rules {
            let sample = match &rule.pattern {
                Pattern::IpPrefix(prefix) => {
                    let missing = 4 - prefix.matches('.').count();
                    format!("{}{}", prefix, vec!["1"; missing].join("."))
                }
                Pattern::DomainSuffix(suffix) => format!("harbor-probe{}", suffix),
                Pattern::Domain(domain) => domain.clone(),
            };
            if config
                .policy
                .allowlist
                .iter()
                .any(|a| a.eq_ignore_ascii_case(&sample))
            {
                continue;
            }
            let verdict = policy.classify(&sample);
            if verdict == Verdict::Allow {
                return Err(format!("'{}' escaped rule '{}'", sample, rule.pattern));
            }
            intercepted += 1;
        }

        Ok(format!(
            "{} allowlist entries allowed, {} rule samples intercepted",
            config.policy.allowlist.len(),
            intercepted
        ))
    }
}

/// A watched file edit is seen within one poll and reacted to exactly once
#[derive(Default)]
struct ConfigChangeReaction {
    dir: Mutex<Option<tempfile::TempDir>>,
}

#[async_trait]
impl Scenario for ConfigChangeReaction {
    fn name(&self) -> &str {
        "config-change-reaction"
    }

    async fn setup(&self, _ctx: &HarnessContext) -> Result<(), String> {
        let dir = tempfile::TempDir::new().map_err(|e| e.to_string())?;
        *self.dir.lock().await = Some(dir);
        Ok(())
    }

    async fn check(&self, _ctx: &HarnessContext) -> Result<String, String> {
        let path = {
            let dir = self.dir.lock().await;
            let dir = dir.as_ref().ok_or("no scratch directory")?;
            dir.path().join("state.json")
        };
        tokio::fs::write(&path, r#"{"revision":1}"#)
            .await
            .map_err(|e| e.to_string())?;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let reaction = FnReaction(move |_change: FileChange| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let mut watched =
            WatchedFile::new(&path, Duration::from_millis(50), Arc::new(reaction)).await;

        if watched.poll().await != PollOutcome::Unchanged {
            return Err("reaction fired without a change".into());
        }
        tokio::fs::write(&path, r#"{"revision":2}"#)
            .await
            .map_err(|e| e.to_string())?;
        if watched.poll().await != PollOutcome::Reacted {
            return Err("edit not detected on the next poll".into());
        }
        for _ in 0..3 {
            watched.poll().await;
        }

        match calls.load(Ordering::SeqCst) {
            1 => Ok("edit detected on the next poll, one reaction".into()),
            n => Err(format!("expected exactly one reaction, saw {}", n)),
        }
    }

    async fn teardown(&self, _ctx: &HarnessContext) {
        self.dir.lock().await.take();
    }
}

fn free_port() -> Result<u16, String> {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .map_err(|e| format!("no free port: {}", e))
}

async fn wait_until_listening(port: u16, timeout: Duration) -> Result<(), String> {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Err(format!("occupant never listened on port {}", port))
}
