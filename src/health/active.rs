//! Active health checking.
//!
//! # Responsibilities
//! - Probe a coordinator's status endpoint
//! - Turn any transport or status failure into an unhealthy verdict

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::{HealthCheckConfig, HealthCheckKind};
use crate::health::state::Health;

/// Failure raised by a checker that could not produce a verdict at all.
///
/// The pool treats it exactly like an unhealthy verdict.
#[derive(Debug, Error)]
#[error("health check failed: {0}")]
pub struct HealthCheckError(pub String);

/// Produces a health verdict for a coordinator address.
#[async_trait]
pub trait HealthCheck: Send + Sync + fmt::Debug {
    async fn check(&self, address: &Url) -> Result<Health, HealthCheckError>;
}

/// Probes `GET {scheme}://{host}{path}` and expects a 200.
#[derive(Debug, Clone)]
pub struct HttpHealthCheck {
    client: reqwest::Client,
    path: String,
}

impl HttpHealthCheck {
    pub fn new(path: impl Into<String>, timeout: Duration) -> Result<Self, HealthCheckError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent("query-balancer-health-check")
            .build()
            .map_err(|e| HealthCheckError(e.to_string()))?;

        Ok(Self {
            client,
            path: path.into(),
        })
    }

    fn status_url(&self, address: &Url) -> Url {
        let mut url = address.clone();
        url.set_path(&self.path);
        url.set_query(None);
        url.set_fragment(None);
        url
    }
}

#[async_trait]
impl HealthCheck for HttpHealthCheck {
    async fn check(&self, address: &Url) -> Result<Health, HealthCheckError> {
        let url = self.status_url(address);

        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Health probe failed: connection error");
                return Ok(Health::unhealthy(format!("error executing http request: {}", e)));
            }
        };

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            tracing::debug!(url = %url, status = %status, "Health probe failed: non-success status");
            return Ok(Health::unhealthy(format!(
                "http request returned {} status code",
                status.as_u16()
            )));
        }

        Ok(Health::healthy("all checks passed"))
    }
}

/// Always healthy. Used when active checks are disabled.
#[derive(Debug, Clone, Default)]
pub struct NoOpHealthCheck;

#[async_trait]
impl HealthCheck for NoOpHealthCheck {
    async fn check(&self, _address: &Url) -> Result<Health, HealthCheckError> {
        Ok(Health::healthy("noop health check"))
    }
}

/// Build the configured checker.
pub fn from_config(config: &HealthCheckConfig) -> Result<Arc<dyn HealthCheck>, HealthCheckError> {
    if !config.enabled {
        tracing::info!("Active health checks disabled, every backend is considered healthy");
        return Ok(Arc::new(NoOpHealthCheck));
    }

    match config.kind {
        HealthCheckKind::Http => Ok(Arc::new(HttpHealthCheck::new(
            config.path.clone(),
            Duration::from_secs(config.timeout_secs),
        )?)),
        HealthCheckKind::Noop => Ok(Arc::new(NoOpHealthCheck)),
    }
}
