use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::models::AlertType;

/// One dependency's probe result in the `/health` response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ServiceHealth {
    /// `ok` | `degraded` | `error`
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Probe round-trip in milliseconds, where measured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<f64>,
}

impl ServiceHealth {
    pub fn ok(latency: Option<f64>) -> Self {
        Self {
            status: "ok",
            message: None,
            latency,
        }
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: "degraded",
            message: Some(message.into()),
            latency: None,
        }
    }

    pub fn error(message: impl Into<String>, latency: Option<f64>) -> Self {
        Self {
            status: "error",
            message: Some(message.into()),
            latency,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ServiceStatuses {
    pub postgres: ServiceHealth,
    pub mongodb: ServiceHealth,
    pub openmeteo: ServiceHealth,
    pub twilio: ServiceHealth,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `healthy` | `degraded` | `unhealthy`
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub services: ServiceStatuses,
}

/// Query parameters for `GET /alerts/history`.
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct HistoryParams {
    pub garden_id: Option<String>,
    pub user_id: Option<i64>,
    pub alert_type: Option<AlertType>,
    /// Inclusive lower bound on the alert timestamp (RFC 3339).
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the alert timestamp (RFC 3339).
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}
