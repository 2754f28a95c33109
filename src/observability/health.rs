//! # Health Probes
//!
//! The health contract with a backend is the HTTP status code only: an instance is
//! healthy when `GET <health_path>` answers exactly `200` within the probe timeout.
//! The body is never read, so backends are free to return whatever payload they like.
//!
//! Probes gate two things: completion of an instance start-up and eligibility for a
//! traffic switch. They never retry on their own; the caller decides how often to poll.

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use std::time::Duration;
use tracing::debug;

use crate::core::config::ManagerConfig;
use crate::core::error::GatewayResult;

/// Health check probe trait so the lifecycle manager can be driven without real backends
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe the instance listening on `port`
    async fn check(&self, port: u16) -> bool;
}

/// HTTP health check probe implementation
pub struct HttpHealthProbe {
    client: HttpClient,
    host: String,
    path: String,
}

impl HttpHealthProbe {
    /// Create a new HTTP health probe
    pub fn new(host: impl Into<String>, path: impl Into<String>, timeout: Duration) -> GatewayResult<Self> {
        let client = HttpClient::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            host: host.into(),
            path: path.into(),
        })
    }

    pub fn from_config(config: &ManagerConfig) -> GatewayResult<Self> {
        Self::new(
            config.health_host.clone(),
            config.health_path.clone(),
            config.health_timeout,
        )
    }

    fn url(&self, port: u16) -> String {
        format!("http://{}:{}{}", self.host, port, self.path)
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self, port: u16) -> bool {
        let url = self.url(port);
        match self.client.get(&url).send().await {
            Ok(response) => {
                let healthy = response.status().as_u16() == 200;
                debug!(%url, status = response.status().as_u16(), healthy, "Health probe answered");
                healthy
            }
            Err(e) => {
                debug!(%url, error = %e, "Health probe failed");
                false
            }
        }
    }
}
