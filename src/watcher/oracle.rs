//! Domain health oracle
//!
//! A probe backend answers `GET {endpoint}/mt.do?url={domain}` with a short
//! bracketed code. `[0]` is clean, `[1]` (gray) and `[2]` (black) mean the
//! domain is blocked. Any other answer is treated as healthy so a confused
//! probe backend cannot demote the whole pool; transport failures, on the
//! other hand, count as unhealthy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::metrics;
use crate::error::{Error, Result};
use crate::utils::strip_whitespace;

/// Outcome of one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    Healthy,
    Unhealthy,
}

impl ProbeVerdict {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
        }
    }
}

/// Classify a probe response body
pub fn classify(body: &str) -> ProbeVerdict {
    match strip_whitespace(body).as_str() {
        "[0]" => ProbeVerdict::Healthy,
        "[1]" | "[2]" => ProbeVerdict::Unhealthy,
        _ => ProbeVerdict::Healthy,
    }
}

/// Decides whether a literal domain is usable
#[async_trait]
pub trait HealthOracle: Send + Sync {
    async fn probe(&self, domain: &str) -> ProbeVerdict;
}

/// HTTP probe oracle cycling through its endpoints on every call
pub struct ProbeOracle {
    client: Client,
    endpoints: Vec<String>,
    next: AtomicUsize,
}

impl ProbeOracle {
    /// Create an oracle over `endpoints`. Endpoints without a scheme get
    /// `http://`. With no endpoints every domain is healthy.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(endpoints: Vec<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::with_source("failed to create probe client", e))?;

        let endpoints = endpoints
            .into_iter()
            .map(|e| {
                let e = e.trim_end_matches('/').to_string();
                if e.contains("://") {
                    e
                } else {
                    format!("http://{e}")
                }
            })
            .collect();

        Ok(Self {
            client,
            endpoints,
            next: AtomicUsize::new(0),
        })
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    fn next_endpoint(&self) -> Option<&str> {
        if self.endpoints.is_empty() {
            return None;
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        Some(&self.endpoints[idx])
    }
}

#[async_trait]
impl HealthOracle for ProbeOracle {
    async fn probe(&self, domain: &str) -> ProbeVerdict {
        let Some(endpoint) = self.next_endpoint() else {
            return ProbeVerdict::Healthy;
        };

        let result = self
            .client
            .get(format!("{endpoint}/mt.do"))
            .query(&[("url", domain)])
            .send()
            .await;

        let verdict = match result {
            Ok(resp) => match resp.text().await {
                Ok(body) => {
                    let verdict = classify(&body);
                    if !verdict.is_healthy() {
                        tracing::warn!(domain, endpoint, body = %body.trim(), "domain flagged by probe");
                    }
                    verdict
                }
                Err(e) => {
                    tracing::warn!(domain, endpoint, error = %e, "probe body unreadable");
                    ProbeVerdict::Unhealthy
                }
            },
            Err(e) => {
                tracing::warn!(domain, endpoint, error = %e, "probe request failed");
                ProbeVerdict::Unhealthy
            }
        };

        tracing::debug!(domain, verdict = verdict.as_str(), "probe finished");
        metrics::record_probe(verdict.as_str());
        verdict
    }
}
