//! Service descriptors

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_millis;

/// Static descriptor of one managed service. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceSpec {
    /// Unique service name
    pub name: String,

    /// Program to launch
    pub command: String,

    /// Arguments passed to the program
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory (relative paths resolve against the config file)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Port the service listens on; reclaimed before launch
    pub port: u16,

    /// How to decide the service is healthy
    #[serde(default)]
    pub health_check: HealthCheckSpec,

    /// Time allowed per launch attempt to reach a healthy probe
    #[serde(
        rename = "startupTimeoutMs",
        with = "duration_millis",
        default = "default_startup_timeout"
    )]
    pub startup_timeout: Duration,

    /// Launch retries before the service is marked failed
    #[serde(default = "default_max_restart_attempts")]
    pub max_restart_attempts: u32,

    /// Services that must be running before this one starts
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Failure of an optional service does not abort `start_all`
    #[serde(default)]
    pub optional: bool,

    /// Extra environment for this service (wins over the global environment)
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ServiceSpec {
    /// URL the health probe should GET
    pub fn health_url(&self) -> String {
        match &self.health_check.url {
            Some(url) => url.clone(),
            None => {
                let path = self.health_check.path.as_deref().unwrap_or(DEFAULT_HEALTH_PATH);
                let sep = if path.starts_with('/') { "" } else { "/" };
                format!("http://127.0.0.1:{}{}{}", self.port, sep, path)
            }
        }
    }
}

/// Default health endpoint when neither `url` nor `path` is configured
pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// HTTP health probe settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HealthCheckSpec {
    /// Full URL to probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Path on `127.0.0.1:<port>`; ignored when `url` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Per-probe timeout
    #[serde(
        rename = "timeoutMs",
        with = "duration_millis",
        default = "default_probe_timeout"
    )]
    pub timeout: Duration,
}

impl Default for HealthCheckSpec {
    fn default() -> Self {
        Self {
            url: None,
            path: None,
            timeout: default_probe_timeout(),
        }
    }
}

fn default_startup_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_restart_attempts() -> u32 {
    3
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(2)
}
