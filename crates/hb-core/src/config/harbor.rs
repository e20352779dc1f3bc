//! Top-level harbor configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::policy::{PolicyConfig, PolicyRuleConfig, RuleActionKind};
use super::serde_utils::duration_millis;
use super::service::{HealthCheckSpec, ServiceSpec};

/// Default localhost port for the IPC endpoint
pub const DEFAULT_IPC_PORT: u16 = 22240;

/// Configuration document for the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct HarborConfig {
    /// Managed services, in configuration order
    pub services: Vec<ServiceSpec>,

    /// Extra ports reclaimed on startup (service ports are always included)
    pub target_ports: Vec<u16>,

    /// Reclaim ports before starting services
    pub cleanup_on_startup: bool,

    /// Environment injected into every service
    pub environment: BTreeMap<String, String>,

    /// Outbound connection policy
    pub policy: PolicyConfig,

    /// Files polled for changes
    pub watchers: Vec<WatcherConfig>,

    /// Background health probing
    pub probe: ProbeConfig,

    /// Backoff between launch attempts
    pub backoff: BackoffConfig,

    /// Process termination settings
    pub shutdown: ShutdownConfig,

    /// IPC port for CLI communication (localhost only)
    pub ipc_port: u16,

    /// Test harness settings
    pub harness: HarnessConfig,

    /// File this configuration was loaded from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Default for HarborConfig {
    fn default() -> Self {
        Self {
            services: Vec::new(),
            target_ports: Vec::new(),
            cleanup_on_startup: true,
            environment: BTreeMap::new(),
            policy: PolicyConfig::default(),
            watchers: Vec::new(),
            probe: ProbeConfig::default(),
            backoff: BackoffConfig::default(),
            shutdown: ShutdownConfig::default(),
            ipc_port: DEFAULT_IPC_PORT,
            harness: HarnessConfig::default(),
            source: None,
        }
    }
}

impl HarborConfig {
    /// Get the IPC address (localhost:port)
    pub fn ipc_address(&self) -> String {
        format!("127.0.0.1:{}", self.ipc_port)
    }

    /// Look up a service by name
    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Every port reclaimed on startup: service ports first, then extras
    pub fn reclaim_ports(&self) -> Vec<u16> {
        self.reclaim_ports_except(&[])
    }

    /// [`reclaim_ports`](Self::reclaim_ports) without the ports in `held`,
    /// which belong to services that are already up
    pub fn reclaim_ports_except(&self, held: &[u16]) -> Vec<u16> {
        let mut ports: Vec<u16> = Vec::new();
        let configured = self.services.iter().map(|s| s.port);
        for port in configured.chain(self.target_ports.iter().copied()) {
            if !ports.contains(&port) && !held.contains(&port) {
                ports.push(port);
            }
        }
        ports
    }

    /// Environment for one service: global values overlaid with its own
    pub fn environment_for(&self, spec: &ServiceSpec) -> BTreeMap<String, String> {
        let mut env = self.environment.clone();
        env.extend(spec.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }

    /// Resolve relative working directories and watcher paths against `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        for service in &mut self.services {
            if let Some(dir) = &service.working_dir {
                if dir.is_relative() {
                    service.working_dir = Some(base.join(dir));
                }
            }
        }
        for watcher in &mut self.watchers {
            if watcher.path.is_relative() {
                watcher.path = base.join(&watcher.path);
            }
        }
    }

    /// A small working example, written by `harbor config init`
    pub fn sample() -> Self {
        let mut config = Self::default();
        config.services = vec![ServiceSpec {
            name: "inference".into(),
            command: "ollama".into(),
            args: vec!["serve".into()],
            working_dir: None,
            port: 11434,
            health_check: HealthCheckSpec {
                url: Some("http://127.0.0.1:11434/api/tags".into()),
                path: None,
                timeout: Duration::from_secs(2),
            },
            startup_timeout: Duration::from_secs(30),
            max_restart_attempts: 3,
            depends_on: Vec::new(),
            optional: false,
            env: BTreeMap::new(),
        }];
        config.policy.rules = vec![
            PolicyRuleConfig {
                pattern: "*.openai.com".into(),
                action: RuleActionKind::RedirectToLocal,
                redirect_target: Some("127.0.0.1:11434".into()),
            },
            PolicyRuleConfig {
                pattern: "8.212.*".into(),
                action: RuleActionKind::Block,
                redirect_target: None,
            },
        ];
        config
    }
}

/// A polled file and what to do when it changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WatcherConfig {
    /// File to poll
    pub path: PathBuf,

    /// Poll interval
    #[serde(
        rename = "pollIntervalMs",
        with = "duration_millis",
        default = "default_poll_interval"
    )]
    pub poll_interval: Duration,

    /// Services restarted when the file changes
    #[serde(default)]
    pub restart: Vec<String>,

    /// Re-read the configuration file when this file changes
    #[serde(default)]
    pub reload_config: bool,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

/// Background health probe configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ProbeConfig {
    /// Interval between probes while running or degraded
    #[serde(rename = "intervalMs", with = "duration_millis")]
    pub interval: Duration,

    /// Consecutive failures that turn a degraded service into a failed one
    pub failure_threshold: u32,

    /// Poll interval while waiting for the first healthy probe
    #[serde(rename = "startupPollMs", with = "duration_millis")]
    pub startup_poll: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            failure_threshold: 3,
            startup_poll: Duration::from_millis(250),
        }
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(rename = "initialMs", with = "duration_millis")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(rename = "maxMs", with = "duration_millis")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

/// Process termination configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ShutdownConfig {
    /// How long a process gets between the graceful and the forceful signal
    #[serde(rename = "gracePeriodMs", with = "duration_millis")]
    pub grace_period: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
        }
    }
}

/// Test harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct HarnessConfig {
    /// Upper bound for one scenario
    #[serde(rename = "scenarioTimeoutMs", with = "duration_millis")]
    pub scenario_timeout: Duration,

    /// Variables every service must see
    pub required_env: Vec<String>,

    /// Where the JSON report is written
    pub report_path: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            scenario_timeout: Duration::from_secs(60),
            required_env: Vec::new(),
            report_path: PathBuf::from("harbor-test-report.json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: HarborConfig = serde_json::from_str("{}").unwrap();
        assert!(config.services.is_empty());
        assert!(config.cleanup_on_startup);
        assert_eq!(config.ipc_port, DEFAULT_IPC_PORT);
        assert_eq!(config.probe.failure_threshold, 3);
        assert_eq!(config.policy.allowlist, vec!["localhost", "127.0.0.1", "::1"]);
    }

    #[test]
    fn test_reclaim_ports_deduplicates() {
        let config: HarborConfig = serde_json::from_str(
            r#"{"services":[{"name":"a","command":"x","port":8080}],
                "targetPorts":[8080, 11434]}"#,
        )
        .unwrap();
        assert_eq!(config.reclaim_ports(), vec![8080, 11434]);
    }

    #[test]
    fn test_reclaim_ports_skips_held_ports() {
        let config: HarborConfig = serde_json::from_str(
            r#"{"services":[{"name":"a","command":"x","port":8080},
                            {"name":"b","command":"x","port":9090}],
                "targetPorts":[8080, 11434]}"#,
        )
        .unwrap();
        assert_eq!(config.reclaim_ports_except(&[8080]), vec![9090, 11434]);
        assert_eq!(config.reclaim_ports_except(&[]), config.reclaim_ports());
    }

    #[test]
    fn test_service_env_overrides_global() {
        let config: HarborConfig = serde_json::from_str(
            r#"{"environment":{"OLLAMA_HOST":"http://localhost:11434","MODE":"dev"},
                "services":[{"name":"a","command":"x","port":1,"env":{"MODE":"test"}}]}"#,
        )
        .unwrap();
        let env = config.environment_for(&config.services[0]);
        assert_eq!(env.get("MODE").map(String::as_str), Some("test"));
        assert_eq!(
            env.get("OLLAMA_HOST").map(String::as_str),
            Some("http://localhost:11434")
        );
    }

    #[test]
    fn test_resolve_paths() {
        let mut config: HarborConfig = serde_json::from_str(
            r#"{"services":[{"name":"a","command":"x","port":1,"workingDir":"svc"}],
                "watchers":[{"path":"state.json"},{"path":"/etc/abs.json"}]}"#,
        )
        .unwrap();
        config.resolve_paths(Path::new("/opt/harbor"));
        assert_eq!(
            config.services[0].working_dir.as_deref(),
            Some(Path::new("/opt/harbor/svc"))
        );
        assert_eq!(config.watchers[0].path, PathBuf::from("/opt/harbor/state.json"));
        assert_eq!(config.watchers[1].path, PathBuf::from("/etc/abs.json"));
        assert_eq!(config.watchers[0].poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_sample_is_valid() {
        let config = HarborConfig::sample();
        assert_eq!(config.services.len(), 1);
        assert!(config.validate().is_ok());
    }
}
