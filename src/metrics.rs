use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::models::AlertType;

/// Latency windows keep at most this many samples per API.
const LATENCY_WINDOW: usize = 100;

/// External APIs whose call latency is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Api {
    OpenMeteo,
    Backend,
}

/// In-process counters and latency windows behind an `Arc`, cheap to clone
/// and safe to update concurrently from timers and request handlers.
#[derive(Clone)]
pub struct MetricsService {
    inner: Arc<RwLock<Inner>>,
}

struct Inner {
    alerts: HashMap<AlertType, u64>,
    sms_sent: u64,
    sms_failed: u64,
    latency: HashMap<Api, VecDeque<f64>>,
    started_at: DateTime<Utc>,
    last_reset: DateTime<Utc>,
}

impl Inner {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            alerts: HashMap::new(),
            sms_sent: 0,
            sms_failed: 0,
            latency: HashMap::new(),
            started_at: now,
            last_reset: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LatencyStats {
    pub count: usize,
    pub total_latency: f64,
    pub average_latency: f64,
    pub min_latency: f64,
    pub max_latency: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SmsStats {
    pub sent: u64,
    pub failed: u64,
    /// `sent / (sent + failed)` rounded to 2 decimals; 0 when no attempts.
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiLatencySnapshot {
    pub openmeteo: LatencyStats,
    pub backend: LatencyStats,
}

/// The `/metrics` response body.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Alert counts keyed by alert type wire name.
    pub alerts: BTreeMap<String, u64>,
    pub sms: SmsStats,
    pub api_latency: ApiLatencySnapshot,
    /// Seconds since process start.
    pub uptime: i64,
    pub last_reset: DateTime<Utc>,
}

impl MetricsService {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::new())),
        }
    }

    pub async fn record_alert(&self, alert_type: AlertType) {
        *self.inner.write().await.alerts.entry(alert_type).or_insert(0) += 1;
    }

    pub async fn record_sms_sent(&self) {
        self.inner.write().await.sms_sent += 1;
    }

    pub async fn record_sms_failed(&self) {
        self.inner.write().await.sms_failed += 1;
    }

    /// Push one latency sample (milliseconds), evicting the oldest sample
    /// once the window holds `LATENCY_WINDOW` entries.
    pub async fn record_api_latency(&self, api: Api, millis: f64) {
        let mut inner = self.inner.write().await;
        let window = inner.latency.entry(api).or_default();
        if window.len() == LATENCY_WINDOW {
            window.pop_front();
        }
        window.push_back(millis);
    }

    /// Zero all counters and windows. Uptime keeps counting from start.
    #[allow(dead_code)]
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.alerts.clear();
        inner.sms_sent = 0;
        inner.sms_failed = 0;
        inner.latency.clear();
        inner.last_reset = Utc::now();
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read().await;
        let alerts = inner
            .alerts
            .iter()
            .map(|(t, n)| (t.as_str().to_owned(), *n))
            .collect();
        let total = inner.sms_sent + inner.sms_failed;
        let success_rate = if total > 0 {
            round2(inner.sms_sent as f64 / total as f64)
        } else {
            0.0
        };
        MetricsSnapshot {
            alerts,
            sms: SmsStats {
                sent: inner.sms_sent,
                failed: inner.sms_failed,
                success_rate,
            },
            api_latency: ApiLatencySnapshot {
                openmeteo: window_stats(inner.latency.get(&Api::OpenMeteo)),
                backend: window_stats(inner.latency.get(&Api::Backend)),
            },
            uptime: (Utc::now() - inner.started_at).num_seconds(),
            last_reset: inner.last_reset,
        }
    }
}

impl Default for MetricsService {
    fn default() -> Self {
        Self::new()
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn window_stats(window: Option<&VecDeque<f64>>) -> LatencyStats {
    let empty = VecDeque::new();
    let window = window.unwrap_or(&empty);
    if window.is_empty() {
        return LatencyStats {
            count: 0,
            total_latency: 0.0,
            average_latency: 0.0,
            min_latency: 0.0,
            max_latency: 0.0,
        };
    }
    let total: f64 = window.iter().sum();
    LatencyStats {
        count: window.len(),
        total_latency: total,
        average_latency: total / window.len() as f64,
        min_latency: window.iter().copied().fold(f64::INFINITY, f64::min),
        max_latency: window.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_snapshot_is_zeroed() {
        let metrics = MetricsService::new();
        let snap = metrics.snapshot().await;
        assert!(snap.alerts.is_empty());
        assert_eq!(snap.sms.sent, 0);
        assert_eq!(snap.sms.success_rate, 0.0);
        assert_eq!(snap.api_latency.backend.count, 0);
    }

    #[tokio::test]
    async fn alert_counts_accumulate_per_type() {
        let metrics = MetricsService::new();
        metrics.record_alert(AlertType::HighTemperature).await;
        metrics.record_alert(AlertType::HighTemperature).await;
        metrics.record_alert(AlertType::StrongWind).await;

        let snap = metrics.snapshot().await;
        assert_eq!(snap.alerts["HIGH_TEMPERATURE"], 2);
        assert_eq!(snap.alerts["STRONG_WIND"], 1);
        assert!(!snap.alerts.contains_key("HEAVY_RAIN"));
    }

    #[tokio::test]
    async fn success_rate_is_sent_over_total_rounded() {
        let metrics = MetricsService::new();
        metrics.record_sms_sent().await;
        metrics.record_sms_sent().await;
        metrics.record_sms_failed().await;

        let snap = metrics.snapshot().await;
        assert_eq!(snap.sms.sent, 2);
        assert_eq!(snap.sms.failed, 1);
        assert_eq!(snap.sms.success_rate, 0.67);
    }

    #[tokio::test]
    async fn latency_window_retains_last_100_samples() {
        let metrics = MetricsService::new();
        for i in 0..150 {
            metrics.record_api_latency(Api::Backend, i as f64).await;
        }

        let snap = metrics.snapshot().await;
        let stats = snap.api_latency.backend;
        assert_eq!(stats.count, 100);
        // Oldest 50 evicted: window is 50..150.
        assert_eq!(stats.min_latency, 50.0);
        assert_eq!(stats.max_latency, 149.0);
    }

    #[tokio::test]
    async fn latency_stats_computed_over_window() {
        let metrics = MetricsService::new();
        metrics.record_api_latency(Api::OpenMeteo, 10.0).await;
        metrics.record_api_latency(Api::OpenMeteo, 30.0).await;

        let snap = metrics.snapshot().await;
        let stats = snap.api_latency.openmeteo;
        assert_eq!(stats.count, 2);
        assert_eq!(stats.total_latency, 40.0);
        assert_eq!(stats.average_latency, 20.0);
        assert_eq!(stats.min_latency, 10.0);
        assert_eq!(stats.max_latency, 30.0);
    }

    #[tokio::test]
    async fn reset_clears_counters_and_stamps_last_reset() {
        let metrics = MetricsService::new();
        metrics.record_alert(AlertType::HeavyRain).await;
        metrics.record_sms_sent().await;
        let before = metrics.snapshot().await.last_reset;

        metrics.reset().await;

        let snap = metrics.snapshot().await;
        assert!(snap.alerts.is_empty());
        assert_eq!(snap.sms.sent, 0);
        assert!(snap.last_reset >= before);
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let metrics = MetricsService::new();
        let clone = metrics.clone();
        clone.record_sms_failed().await;
        assert_eq!(metrics.snapshot().await.sms.failed, 1);
    }
}
