//! Orchestrator lifecycle tests with a scripted health probe and real
//! `sleep` processes standing in for services.

#![cfg(unix)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hb_core::config::{parse_json, HarborConfig, ServiceSpec};
use hb_core::error::{ConfigError, HarborError, HealthCheckFailure, ServiceError};
use hb_core::process::is_process_alive;
use hb_core::traits::HealthProbe;
use hb_core::types::LifecycleState;
use hb_orchestrator::Orchestrator;

/// Health answers controlled by the test, healthy unless told otherwise
#[derive(Default)]
struct ScriptedProbe {
    unhealthy: Mutex<HashMap<String, bool>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedProbe {
    fn set_healthy(&self, name: &str, healthy: bool) {
        self.unhealthy
            .lock()
            .unwrap()
            .insert(name.to_string(), !healthy);
    }

    fn calls(&self, name: &str) -> usize {
        self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self, spec: &ServiceSpec) -> Result<(), HealthCheckFailure> {
        *self.calls.lock().unwrap().entry(spec.name.clone()).or_default() += 1;
        let unhealthy = self
            .unhealthy
            .lock()
            .unwrap()
            .get(&spec.name)
            .copied()
            .unwrap_or(false);
        if unhealthy {
            Err(HealthCheckFailure::Status(503))
        } else {
            Ok(())
        }
    }
}

fn config(services: &str, failure_threshold: u32) -> HarborConfig {
    parse_json(&format!(
        r#"{{
            "services": {},
            "cleanupOnStartup": false,
            "probe": {{ "intervalMs": 50, "failureThreshold": {}, "startupPollMs": 20 }},
            "backoff": {{ "initialMs": 10, "maxMs": 20, "multiplier": 2.0, "jitter": 0.0 }},
            "shutdown": {{ "gracePeriodMs": 500 }}
        }}"#,
        services, failure_threshold
    ))
    .unwrap()
}

/// `extra` is spliced into the object; defaults fill whatever it leaves out
fn sleeper(name: &str, port: u16, deps: &[&str], extra: &str) -> String {
    let mut extra = extra.to_string();
    if !extra.contains("startupTimeoutMs") {
        extra.push_str(r#", "startupTimeoutMs": 200"#);
    }
    if !extra.contains("maxRestartAttempts") {
        extra.push_str(r#", "maxRestartAttempts": 1"#);
    }
    format!(
        r#"{{ "name": "{}", "command": "sleep", "args": ["30"], "port": {},
              "dependsOn": {:?} {} }}"#,
        name, port, deps, extra
    )
}

fn orchestrator(services: &[String]) -> (Orchestrator, Arc<ScriptedProbe>) {
    orchestrator_with(services, 2)
}

fn orchestrator_with(services: &[String], failure_threshold: u32) -> (Orchestrator, Arc<ScriptedProbe>) {
    let probe = Arc::new(ScriptedProbe::default());
    let config = config(&format!("[{}]", services.join(",")), failure_threshold);
    (Orchestrator::new(config, probe.clone()).unwrap(), probe)
}

async fn wait_for_state(orch: &Orchestrator, name: &str, state: LifecycleState) -> bool {
    for _ in 0..100 {
        if orch.snapshot(name).map(|s| s.state) == Some(state) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_start_all_runs_in_dependency_order() {
    let (orch, _probe) = orchestrator(&[
        sleeper("proxy", 41001, &["llm"], ""),
        sleeper("llm", 41002, &[], ""),
    ]);
    assert_eq!(*orch.start_order(), ["llm", "proxy"]);

    orch.start_all().await.unwrap();

    let status = orch.status();
    let llm = &status["llm"];
    let proxy = &status["proxy"];
    assert_eq!(llm.state, LifecycleState::Running);
    assert_eq!(proxy.state, LifecycleState::Running);
    assert!(llm.since <= proxy.since);
    let pids = [llm.pid.unwrap(), proxy.pid.unwrap()];
    assert!(pids.iter().all(|p| is_process_alive(*p)));

    orch.stop_all().await;
    for snapshot in orch.status().values() {
        assert_eq!(snapshot.state, LifecycleState::Stopped);
        assert!(snapshot.pid.is_none());
    }
    assert!(pids.iter().all(|p| !is_process_alive(*p)));
}

#[tokio::test]
async fn test_failed_dependency_leaves_dependent_pending() {
    let (orch, probe) = orchestrator(&[
        sleeper("a", 41011, &[], ""),
        sleeper("b", 41012, &["a"], ""),
    ]);
    probe.set_healthy("a", false);

    let err = orch.start_all().await.unwrap_err();
    match err {
        HarborError::Service(ServiceError::Failed { name, reason }) => {
            assert_eq!(name, "a");
            assert!(reason.contains("gave up after 1 restarts"), "{}", reason);
        }
        other => panic!("expected a to fail, got {:?}", other),
    }

    let a = orch.snapshot("a").unwrap();
    assert_eq!(a.state, LifecycleState::Failed);
    // One launch plus one retry; the final failure is not a restart
    assert_eq!(a.restart_count, 1);
    assert!(a.pid.is_none());
    assert_eq!(orch.snapshot("b").unwrap().state, LifecycleState::Pending);
    assert_eq!(probe.calls("b"), 0);

    orch.stop_all().await;
}

#[tokio::test]
async fn test_optional_failure_does_not_abort() {
    let (orch, probe) = orchestrator(&[
        sleeper("extra", 41021, &[], r#", "optional": true"#),
        sleeper("needs-extra", 41022, &["extra"], ""),
        sleeper("core", 41023, &[], ""),
    ]);
    probe.set_healthy("extra", false);

    orch.start_all().await.unwrap();
    assert_eq!(orch.snapshot("extra").unwrap().state, LifecycleState::Failed);
    let waiting = orch.snapshot("needs-extra").unwrap();
    assert_eq!(waiting.state, LifecycleState::Pending);
    assert!(waiting.last_error.unwrap().contains("extra"));
    assert_eq!(orch.snapshot("core").unwrap().state, LifecycleState::Running);

    orch.stop_all().await;
}

#[tokio::test]
async fn test_cycle_rejected_before_anything_spawns() {
    let probe = Arc::new(ScriptedProbe::default());
    let config: HarborConfig = serde_json::from_str(
        r#"{"services":[
            {"name":"a","command":"sleep","args":["30"],"port":41031,"dependsOn":["b"]},
            {"name":"b","command":"sleep","args":["30"],"port":41032,"dependsOn":["a"]}
        ]}"#,
    )
    .unwrap();

    let result = Orchestrator::new(config, probe.clone());
    assert!(matches!(result, Err(ConfigError::DependencyCycle(_))));
    assert_eq!(probe.calls("a") + probe.calls("b"), 0);
}

#[tokio::test]
async fn test_degraded_then_recovered() {
    let (orch, probe) = orchestrator_with(&[sleeper("llm", 41041, &[], "")], 1000);
    orch.start_all().await.unwrap();

    // Far below the failure threshold, so failing probes only degrade
    probe.set_healthy("llm", false);
    assert!(wait_for_state(&orch, "llm", LifecycleState::Degraded).await);
    probe.set_healthy("llm", true);
    assert!(wait_for_state(&orch, "llm", LifecycleState::Running).await);

    orch.stop_all().await;
}

#[tokio::test]
async fn test_repeated_probe_failures_restart_the_service() {
    let (orch, probe) = orchestrator(&[sleeper(
        "llm",
        41051,
        &[],
        r#", "maxRestartAttempts": 5"#,
    )]);
    orch.start_all().await.unwrap();
    let first_pid = orch.snapshot("llm").unwrap().pid.unwrap();

    probe.set_healthy("llm", false);
    let mut restarted = false;
    for _ in 0..100 {
        if orch.snapshot("llm").unwrap().restart_count >= 1 {
            restarted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(restarted, "two failed probes must trigger a restart");
    probe.set_healthy("llm", true);
    assert!(wait_for_state(&orch, "llm", LifecycleState::Running).await);

    let snapshot = orch.snapshot("llm").unwrap();
    assert_ne!(snapshot.pid, Some(first_pid));
    assert!(snapshot.restart_count >= 1);
    assert!(!is_process_alive(first_pid));

    orch.stop_all().await;
}

#[tokio::test]
async fn test_exited_process_is_relaunched() {
    let (orch, _probe) = orchestrator(&[sleeper(
        "llm",
        41061,
        &[],
        r#", "maxRestartAttempts": 5"#,
    )]);
    orch.start_all().await.unwrap();
    let first_pid = orch.snapshot("llm").unwrap().pid.unwrap();

    // Simulate a crash behind the orchestrator's back
    hb_core::process::force_kill(first_pid).unwrap();

    let mut relaunched = false;
    for _ in 0..100 {
        let snapshot = orch.snapshot("llm").unwrap();
        if snapshot.state == LifecycleState::Running && snapshot.pid != Some(first_pid) {
            relaunched = snapshot.pid.is_some();
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(relaunched);

    orch.stop_all().await;
}

#[tokio::test]
async fn test_restart_replaces_process() {
    let (orch, _probe) = orchestrator(&[sleeper("llm", 41071, &[], "")]);
    orch.start_all().await.unwrap();
    let before = orch.snapshot("llm").unwrap().pid.unwrap();

    orch.restart("llm").await.unwrap();
    let after = orch.snapshot("llm").unwrap();
    assert_eq!(after.state, LifecycleState::Running);
    assert_ne!(after.pid, Some(before));
    assert!(!is_process_alive(before));

    assert!(matches!(
        orch.restart("ghost").await,
        Err(ServiceError::NotFound(_))
    ));

    orch.stop_all().await;
}

#[tokio::test]
async fn test_restart_requires_running_dependencies() {
    let (orch, _probe) = orchestrator(&[
        sleeper("a", 41081, &[], ""),
        sleeper("b", 41082, &["a"], ""),
    ]);
    assert!(matches!(
        orch.restart("b").await,
        Err(ServiceError::DependencyNotRunning { .. })
    ));
}

#[tokio::test]
async fn test_stop_all_cancels_in_flight_start() {
    let (orch, probe) = orchestrator(&[sleeper(
        "slow",
        41091,
        &[],
        r#", "startupTimeoutMs": 30000, "maxRestartAttempts": 10"#,
    )]);
    probe.set_healthy("slow", false);

    let starter = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.start_all().await })
    };
    assert!(wait_for_state(&orch, "slow", LifecycleState::HealthChecking).await);
    let pid = orch.snapshot("slow").unwrap().pid.unwrap();

    let stopped = tokio::time::timeout(Duration::from_secs(5), orch.stop_all()).await;
    assert!(stopped.is_ok(), "stop_all must not wait for the startup timeout");

    let result = starter.await.unwrap();
    assert!(matches!(
        result,
        Err(HarborError::Service(ServiceError::Cancelled(_)))
    ));
    assert_eq!(orch.snapshot("slow").unwrap().state, LifecycleState::Stopped);
    assert!(!is_process_alive(pid));
}

#[tokio::test]
async fn test_orchestrator_is_reusable_after_stop() {
    let (orch, _probe) = orchestrator(&[sleeper("llm", 41101, &[], "")]);
    orch.start_all().await.unwrap();
    orch.stop_all().await;
    orch.start_all().await.unwrap();
    assert_eq!(orch.snapshot("llm").unwrap().state, LifecycleState::Running);
    orch.stop_all().await;
}

#[tokio::test]
async fn test_apply_config_reports_changed_services() {
    let (orch, _probe) = orchestrator(&[
        sleeper("a", 41111, &[], ""),
        sleeper("b", 41112, &[], ""),
    ]);
    let mut updated = (*orch.config()).clone();
    updated.services[1].args = vec!["60".into()];
    assert_eq!(orch.apply_config(updated.clone()).unwrap(), vec!["b"]);
    assert_eq!(orch.apply_config(updated.clone()).unwrap(), Vec::<String>::new());

    updated
        .environment
        .insert("MODE".into(), "changed".into());
    assert_eq!(orch.apply_config(updated).unwrap(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_reload_recomputes_start_order() {
    let (orch, _probe) = orchestrator(&[
        sleeper("a", 41121, &[], ""),
        sleeper("b", 41122, &[], ""),
    ]);
    assert_eq!(*orch.start_order(), ["a", "b"]);

    let mut updated = (*orch.config()).clone();
    updated.services[0].depends_on = vec!["b".into()];
    orch.apply_config(updated).unwrap();
    assert_eq!(*orch.start_order(), ["b", "a"]);

    orch.start_all().await.unwrap();
    let a = orch.snapshot("a").unwrap();
    let b = orch.snapshot("b").unwrap();
    assert_eq!(a.state, LifecycleState::Running);
    assert_eq!(b.state, LifecycleState::Running);
    assert!(b.since <= a.since);

    orch.stop_all().await;
    assert_eq!(orch.snapshot("a").unwrap().state, LifecycleState::Stopped);
    assert_eq!(orch.snapshot("b").unwrap().state, LifecycleState::Stopped);
}

#[tokio::test]
async fn test_reload_rejects_cycle_and_keeps_order() {
    let (orch, _probe) = orchestrator(&[
        sleeper("a", 41131, &[], ""),
        sleeper("b", 41132, &["a"], ""),
    ]);
    let mut updated = (*orch.config()).clone();
    updated.services[0].depends_on = vec!["b".into()];

    let err = orch.apply_config(updated).unwrap_err();
    assert!(matches!(err, ConfigError::DependencyCycle(_)), "{:?}", err);
    assert_eq!(*orch.start_order(), ["a", "b"]);
    assert!(orch.config().services[0].depends_on.is_empty());
}
