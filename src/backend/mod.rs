use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::metrics::{Api, MetricsService};
use crate::models::{Plant, User};

/// HTTP attempts per request, counting the first one.
const MAX_ATTEMPTS: u32 = 3;

/// Raised once every attempt against the plants backend has failed.
#[derive(Debug, Error)]
#[error("plants backend unavailable after {attempts} attempts: {message}")]
pub struct BackendUnavailable {
    pub attempts: u32,
    pub message: String,
}

/// Read-only client for the plants/users backend.
///
/// Both operations share one retry policy: up to [`MAX_ATTEMPTS`] attempts
/// with exponential backoff (1 s, 2 s) between them, retrying on transport
/// errors and any non-2xx status. The latency of the whole attempt chain is
/// reported once.
#[derive(Clone)]
pub struct PlantsClient {
    http: Client,
    base_url: String,
    metrics: Option<MetricsService>,
}

impl PlantsClient {
    pub fn new(base_url: String, metrics: Option<MetricsService>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            metrics,
        }
    }

    /// `GET /api/plants?userId=<id>`
    pub async fn fetch_user_plants(&self, user_id: i64) -> Result<Vec<Plant>, BackendUnavailable> {
        let url = format!("{}/api/plants?userId={user_id}", self.base_url);
        self.get_with_retry(&url).await
    }

    /// `GET /api/users/<id>`
    pub async fn fetch_user(&self, user_id: i64) -> Result<User, BackendUnavailable> {
        let url = format!("{}/api/users/{user_id}", self.base_url);
        self.get_with_retry(&url).await
    }

    async fn get_with_retry<T: DeserializeOwned>(&self, url: &str) -> Result<T, BackendUnavailable> {
        let started = tokio::time::Instant::now();
        let result = self.attempt_chain(url).await;
        if let Some(metrics) = &self.metrics {
            metrics
                .record_api_latency(Api::Backend, started.elapsed().as_secs_f64() * 1000.0)
                .await;
        }
        result
    }

    async fn attempt_chain<T: DeserializeOwned>(&self, url: &str) -> Result<T, BackendUnavailable> {
        let mut last_error = String::new();

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(url, attempt, delay_ms = delay.as_millis() as u64, "Backend request failed, retrying");
                tokio::time::sleep(delay).await;
            }

            let response = match self.http.get(url).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                last_error = format!("status {status}");
                continue;
            }

            return response.json::<T>().await.map_err(|e| BackendUnavailable {
                attempts: attempt + 1,
                message: format!("undecodable response body: {e}"),
            });
        }

        debug!(url, error = %last_error, "Backend unavailable, attempts exhausted");
        Err(BackendUnavailable {
            attempts: MAX_ATTEMPTS,
            message: last_error,
        })
    }
}
