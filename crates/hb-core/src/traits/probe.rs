//! Health probe abstraction

use async_trait::async_trait;

use crate::config::ServiceSpec;
use crate::error::HealthCheckFailure;

/// Decides whether a service is answering its health check.
///
/// The orchestrator only depends on this trait, so tests can script health
/// outcomes without binding real ports.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe once. `Ok(())` means healthy.
    async fn probe(&self, spec: &ServiceSpec) -> Result<(), HealthCheckFailure>;
}
