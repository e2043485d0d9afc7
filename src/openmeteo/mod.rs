pub mod models;

use chrono::Utc;
use reqwest::Client;
use tracing::{debug, warn};

use crate::metrics::{Api, MetricsService};
use crate::models::WeatherSnapshot;

use self::models::ForecastResponse;

/// Client for the Open-Meteo forecast API.
///
/// `fetch_weather` never fails outward: any transport error, non-2xx status
/// or undecodable body yields `None` so one flaky fetch only skips that
/// garden's evaluation.
#[derive(Clone)]
pub struct WeatherClient {
    http: Client,
    base_url: String,
    metrics: Option<MetricsService>,
}

impl WeatherClient {
    pub fn new(base_url: String, metrics: Option<MetricsService>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            metrics,
        }
    }

    /// Fetch current conditions for a coordinate. Missing upstream values
    /// are normalized to 0; `observed_at` is stamped at fetch time.
    pub async fn fetch_weather(&self, latitude: f64, longitude: f64) -> Option<WeatherSnapshot> {
        let url = format!(
            "{}/v1/forecast?latitude={latitude}&longitude={longitude}\
             &current=temperature_2m,precipitation,wind_speed_10m\
             &daily=temperature_2m_max,temperature_2m_min&timezone=auto",
            self.base_url
        );
        debug!(latitude, longitude, "Fetching weather");

        let started = tokio::time::Instant::now();
        let response = match self.http.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(latitude, longitude, error = %e, "Weather request failed");
                return None;
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics
                .record_api_latency(Api::OpenMeteo, started.elapsed().as_secs_f64() * 1000.0)
                .await;
        }

        if !response.status().is_success() {
            warn!(latitude, longitude, status = %response.status(), "Weather endpoint returned error status");
            return None;
        }

        let forecast: ForecastResponse = match response.json().await {
            Ok(f) => f,
            Err(e) => {
                warn!(latitude, longitude, error = %e, "Failed to decode weather response");
                return None;
            }
        };

        Some(snapshot_from(forecast))
    }
}

fn snapshot_from(forecast: ForecastResponse) -> WeatherSnapshot {
    let current = forecast.current.unwrap_or_default();
    let daily = forecast.daily.unwrap_or_default();
    WeatherSnapshot {
        temperature: current.temperature_2m.unwrap_or(0.0),
        temperature_max: daily.today_max().unwrap_or(0.0),
        temperature_min: daily.today_min().unwrap_or(0.0),
        precipitation: current.precipitation.unwrap_or(0.0),
        wind_speed: current.wind_speed_10m.unwrap_or(0.0),
        observed_at: Utc::now(),
    }
}
