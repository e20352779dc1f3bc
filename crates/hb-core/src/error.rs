//! Core error types for harbor

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the harbor ecosystem
#[derive(Error, Debug)]
pub enum HarborError {
    /// Configuration error (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Port could not be reclaimed
    #[error("Port conflict: {0}")]
    PortConflict(#[from] PortConflictError),

    /// Service lifecycle error
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Watcher reaction failed
    #[error("Watcher error: {0}")]
    Watcher(#[from] WatcherReactionError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// JSON parse error
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Two services share a name
    #[error("Duplicate service name: {0}")]
    DuplicateService(String),

    /// Two services share a port
    #[error("Port {port} is claimed by both '{first}' and '{second}'")]
    DuplicatePort {
        port: u16,
        first: String,
        second: String,
    },

    /// A dependency names a service that does not exist
    #[error("Service '{service}' depends on unknown service '{dependency}'")]
    UnknownDependency { service: String, dependency: String },

    /// The dependency graph contains a cycle
    #[error("Dependency cycle between services: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    /// A policy rule failed to compile
    #[error("Invalid policy rule: {0}")]
    Policy(#[from] PolicyMatchError),
}

/// Malformed policy rules. Only ever raised while loading configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyMatchError {
    /// Pattern is empty or whitespace
    #[error("empty pattern")]
    EmptyPattern,

    /// Wildcard appears somewhere other than a leading `*.` or trailing `.*`
    #[error("misplaced wildcard in pattern '{0}'")]
    MisplacedWildcard(String),

    /// `a.b.*` style pattern whose prefix is not made of IPv4 octets
    #[error("IP prefix pattern '{0}' must be 1-3 dotted octets followed by '.*'")]
    InvalidIpPrefix(String),

    /// `redirect-to-local` without a target
    #[error("rule '{0}' redirects but has no redirectTarget")]
    MissingRedirectTarget(String),

    /// `block` with a target
    #[error("rule '{0}' blocks but also names a redirectTarget")]
    UnexpectedRedirectTarget(String),

    /// Target is not `host:port`
    #[error("invalid redirect target '{0}', expected host:port")]
    InvalidTarget(String),
}

/// Port reclaim errors
#[derive(Error, Debug)]
pub enum PortConflictError {
    /// Socket owners could not be enumerated
    #[error("failed to enumerate owners of port {port}: {reason}")]
    Enumerate { port: u16, reason: String },

    /// Force-termination did not free the port
    #[error("could not free port {port}: {reason}")]
    Unrecoverable { port: u16, reason: String },
}

/// Service lifecycle errors
#[derive(Error, Debug)]
pub enum ServiceError {
    /// No service with that name
    #[error("Service not found: {0}")]
    NotFound(String),

    /// Process could not be spawned
    #[error("Failed to launch '{name}': {reason}")]
    Launch { name: String, reason: String },

    /// Health probe failed
    #[error("Health check failed for '{name}': {failure}")]
    HealthCheck {
        name: String,
        failure: HealthCheckFailure,
    },

    /// Retries exhausted
    #[error("Service '{name}' failed: {reason}")]
    Failed { name: String, reason: String },

    /// A dependency is not running
    #[error("Service '{name}' cannot start: dependency '{dependency}' is not running")]
    DependencyNotRunning { name: String, dependency: String },

    /// Shutdown was requested while the operation was in flight
    #[error("Operation on '{0}' cancelled by shutdown")]
    Cancelled(String),
}

/// Why a single health probe did not succeed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HealthCheckFailure {
    /// Non-2xx status
    #[error("unhealthy status {0}")]
    Status(u16),

    /// Probe did not answer within its timeout
    #[error("timed out")]
    Timeout,

    /// Connection refused, DNS failure and similar
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// Process exited before becoming healthy
    #[error("process exited: {0}")]
    Exited(String),
}

/// A watcher reaction failed; the change is retried on the next tick
#[derive(Error, Debug)]
#[error("reaction to {path} failed: {reason}")]
pub struct WatcherReactionError {
    pub path: PathBuf,
    pub reason: String,
}

impl WatcherReactionError {
    /// Create a reaction error for a watched path
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
