//! # Service Health Checking
//!
//! On-demand health probes for every configured upstream, backing the
//! gateway's `/api/v1/services/status` endpoint. Each service's health path
//! is probed concurrently with a short timeout; a 200 is healthy, anything
//! else (including transport failures) is unhealthy. Results are not cached
//! and do not influence routing.

use crate::core::config::ServiceConfig;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Health summary for one service.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServiceStatusReport {
    /// `"healthy"` or `"unhealthy"`.
    pub status: &'static str,

    /// Probe round-trip time in seconds, when the probe completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,

    /// Probe failure description, when it did not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct HealthTarget {
    name: String,
    url: String,
}

/// Probes every configured service's health endpoint.
pub struct ServiceHealthChecker {
    client: reqwest::Client,
    targets: Vec<HealthTarget>,
}

impl ServiceHealthChecker {
    pub fn new(services: &HashMap<String, ServiceConfig>) -> Self {
        Self::with_probe_timeout(services, Duration::from_secs(5))
    }

    pub fn with_probe_timeout(
        services: &HashMap<String, ServiceConfig>,
        probe_timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(probe_timeout)
            .build()
            .unwrap_or_default();

        let mut targets: Vec<HealthTarget> = services
            .iter()
            .map(|(name, service)| HealthTarget {
                name: name.clone(),
                url: service.health_url(),
            })
            .collect();
        targets.sort_by(|a, b| a.name.cmp(&b.name));

        Self { client, targets }
    }

    /// Probe all services concurrently and collect their status.
    pub async fn check_all(&self) -> HashMap<String, ServiceStatusReport> {
        let probes = self.targets.iter().map(|target| async {
            let report = self.probe(&target.url).await;
            (target.name.clone(), report)
        });

        futures::future::join_all(probes).await.into_iter().collect()
    }

    async fn probe(&self, url: &str) -> ServiceStatusReport {
        let started = Instant::now();
        match self.client.get(url).send().await {
            Ok(response) => {
                let elapsed = started.elapsed().as_secs_f64();
                let status = if response.status().is_success() {
                    "healthy"
                } else {
                    "unhealthy"
                };
                debug!(url, status, elapsed, "health probe completed");
                ServiceStatusReport {
                    status,
                    response_time: Some(elapsed),
                    error: None,
                }
            }
            Err(e) => {
                debug!(url, error = %e, "health probe failed");
                ServiceStatusReport {
                    status: "unhealthy",
                    response_time: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
