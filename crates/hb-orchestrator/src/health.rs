//! HTTP health probing

use std::time::Duration;

use async_trait::async_trait;
use hb_core::config::ServiceSpec;
use hb_core::error::HealthCheckFailure;
use hb_core::traits::HealthProbe;

/// GETs the service's health URL; any 2xx inside the timeout is healthy.
#[derive(Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        // Health endpoints are local; an HTTP(S)_PROXY must never intercept them
        let client = reqwest::Client::builder()
            .no_proxy()
            .connect_timeout(Duration::from_secs(2))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, spec: &ServiceSpec) -> Result<(), HealthCheckFailure> {
        let response = self
            .client
            .get(spec.health_url())
            .timeout(spec.health_check.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    HealthCheckFailure::Timeout
                } else {
                    HealthCheckFailure::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(HealthCheckFailure::Status(status.as_u16()))
        }
    }
}
