use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::Response,
    Json,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;
use utoipa::OpenApi;

use super::dto::{HealthResponse, HistoryParams, ServiceHealth, ServiceStatuses};
use super::AppState;
use crate::channels::broadcast::BroadcastChannel;
use crate::channels::history::HistoryFilter;
use crate::metrics::MetricsSnapshot;
use crate::models::Alert;

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Probe every dependency and report per-service plus overall status.
/// `200` only when overall is `healthy`, `503` otherwise.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "All dependencies healthy", body = HealthResponse),
        (status = 503, description = "One or more dependencies degraded or down", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (postgres, openmeteo, mongodb) = tokio::join!(
        probe_http(&state, format!("{}/api/health", state.backend_url)),
        probe_http(
            &state,
            format!(
                "{}/v1/forecast?latitude=0&longitude=0&current=temperature_2m",
                state.open_meteo_base_url
            ),
        ),
        probe_mongo(&state),
    );
    let twilio = if state.sms_enabled {
        ServiceHealth::ok(None)
    } else {
        ServiceHealth::degraded("SMS disabled (Twilio not configured)")
    };

    let services = ServiceStatuses {
        postgres,
        mongodb,
        openmeteo,
        twilio,
    };
    let status = overall_status(&services);
    let code = if status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(HealthResponse {
            status,
            timestamp: Utc::now(),
            services,
        }),
    )
}

async fn probe_http(state: &AppState, url: String) -> ServiceHealth {
    let started = tokio::time::Instant::now();
    match state.http.get(&url).send().await {
        Ok(response) => {
            let latency = started.elapsed().as_secs_f64() * 1000.0;
            if response.status().is_success() {
                ServiceHealth::ok(Some(latency))
            } else {
                ServiceHealth::error(format!("status {}", response.status()), Some(latency))
            }
        }
        Err(e) => ServiceHealth::error(e.to_string(), None),
    }
}

async fn probe_mongo(state: &AppState) -> ServiceHealth {
    let started = tokio::time::Instant::now();
    match state.history.ping().await {
        Ok(()) => ServiceHealth::ok(Some(started.elapsed().as_secs_f64() * 1000.0)),
        Err(e) => ServiceHealth::error(e.to_string(), None),
    }
}

/// Aggregate per-service statuses: `unhealthy` iff the backend or the
/// weather provider errored, else `degraded` when anything is not `ok`.
pub(crate) fn overall_status(services: &ServiceStatuses) -> &'static str {
    if services.postgres.status == "error" || services.openmeteo.status == "error" {
        return "unhealthy";
    }
    let all_ok = [
        &services.postgres,
        &services.mongodb,
        &services.openmeteo,
        &services.twilio,
    ]
    .iter()
    .all(|s| s.status == "ok");
    if all_ok {
        "healthy"
    } else {
        "degraded"
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Alert counts, SMS outcomes and API latency windows since the last reset.
#[utoipa::path(
    get,
    path = "/metrics",
    responses(
        (status = 200, description = "Current service metrics", body = MetricsSnapshot),
    ),
    tag = "system"
)]
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot().await)
}

// ---------------------------------------------------------------------------
// Alert history
// ---------------------------------------------------------------------------

/// Query persisted alerts, newest first. Returns an empty list when the
/// history store is degraded.
#[utoipa::path(
    get,
    path = "/alerts/history",
    params(HistoryParams),
    responses(
        (status = 200, description = "Matching alerts, newest first", body = Vec<Alert>),
    ),
    tag = "alerts"
)]
pub async fn alert_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<Alert>> {
    let filter = HistoryFilter {
        garden_id: params.garden_id,
        user_id: params.user_id,
        alert_type: params.alert_type,
        start_date: params.start_date,
        end_date: params.end_date,
    };
    Json(state.history.get_alert_history(&filter, params.limit).await)
}

// ---------------------------------------------------------------------------
// WebSocket subscribers
// ---------------------------------------------------------------------------

/// Upgrade to a WebSocket and register the connection as an alert
/// subscriber. Inbound messages are ignored.
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.broadcast.clone()))
}

async fn handle_socket(socket: WebSocket, broadcast: BroadcastChannel) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let id = broadcast.subscribe(tx).await;

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(Message::Text(message.into())).await.is_err() {
                break;
            }
        }
    });
    // Drain and discard inbound frames; exit on close or error.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            debug!(bytes = message.into_data().len(), "Ignoring inbound subscriber message");
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    broadcast.unsubscribe(id).await;
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(health, metrics, alert_history),
    components(schemas(
        HealthResponse,
        super::dto::ServiceStatuses,
        super::dto::ServiceHealth,
        MetricsSnapshot,
        crate::metrics::SmsStats,
        crate::metrics::LatencyStats,
        crate::metrics::ApiLatencySnapshot,
        Alert,
        crate::models::AlertType,
        crate::models::AlertMetric,
    )),
    tags(
        (name = "system", description = "Health and metrics endpoints"),
        (name = "alerts", description = "Alert history endpoints"),
    ),
    info(
        title = "Garden Watch API",
        version = "0.1.0",
        description = "Operational surface of the garden climate-risk monitor"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum_test::TestServer;
    use serde_json::Value;

    use super::*;
    use crate::api::router;
    use crate::channels::history::HistoryStore;
    use crate::metrics::MetricsService;

    async fn test_state() -> AppState {
        AppState {
            http: reqwest::Client::new(),
            backend_url: "http://127.0.0.1:1".into(),
            open_meteo_base_url: "http://127.0.0.1:1".into(),
            sms_enabled: false,
            metrics: MetricsService::new(),
            broadcast: BroadcastChannel::new(),
            history: Arc::new(HistoryStore::connect(None).await),
        }
    }

    async fn test_server() -> TestServer {
        TestServer::new(router(test_state().await)).unwrap()
    }

    // -----------------------------------------------------------------------
    // overall_status
    // -----------------------------------------------------------------------

    fn statuses(
        postgres: ServiceHealth,
        mongodb: ServiceHealth,
        openmeteo: ServiceHealth,
        twilio: ServiceHealth,
    ) -> ServiceStatuses {
        ServiceStatuses {
            postgres,
            mongodb,
            openmeteo,
            twilio,
        }
    }

    #[test]
    fn all_ok_is_healthy() {
        let s = statuses(
            ServiceHealth::ok(Some(1.0)),
            ServiceHealth::ok(Some(1.0)),
            ServiceHealth::ok(Some(1.0)),
            ServiceHealth::ok(None),
        );
        assert_eq!(overall_status(&s), "healthy");
    }

    #[test]
    fn backend_error_is_unhealthy() {
        let s = statuses(
            ServiceHealth::error("down", None),
            ServiceHealth::ok(None),
            ServiceHealth::ok(None),
            ServiceHealth::ok(None),
        );
        assert_eq!(overall_status(&s), "unhealthy");
    }

    #[test]
    fn weather_error_is_unhealthy() {
        let s = statuses(
            ServiceHealth::ok(None),
            ServiceHealth::ok(None),
            ServiceHealth::error("down", None),
            ServiceHealth::ok(None),
        );
        assert_eq!(overall_status(&s), "unhealthy");
    }

    #[test]
    fn mongo_error_only_degrades() {
        let s = statuses(
            ServiceHealth::ok(None),
            ServiceHealth::error("down", None),
            ServiceHealth::ok(None),
            ServiceHealth::ok(None),
        );
        assert_eq!(overall_status(&s), "degraded");
    }

    #[test]
    fn disabled_twilio_only_degrades() {
        let s = statuses(
            ServiceHealth::ok(None),
            ServiceHealth::ok(None),
            ServiceHealth::ok(None),
            ServiceHealth::degraded("SMS disabled"),
        );
        assert_eq!(overall_status(&s), "degraded");
    }

    // -----------------------------------------------------------------------
    // Endpoints
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn health_reports_unreachable_dependencies() {
        let server = test_server().await;
        let resp = server.get("/health").await;
        resp.assert_status(StatusCode::SERVICE_UNAVAILABLE);

        let body: Value = resp.json();
        assert_eq!(body["status"], "unhealthy");
        assert_eq!(body["services"]["postgres"]["status"], "error");
        assert_eq!(body["services"]["openmeteo"]["status"], "error");
        assert_eq!(body["services"]["mongodb"]["status"], "error");
        assert_eq!(body["services"]["twilio"]["status"], "degraded");
    }

    #[tokio::test]
    async fn metrics_returns_zeroed_snapshot() {
        let server = test_server().await;
        let resp = server.get("/metrics").await;
        resp.assert_status_ok();

        let body: Value = resp.json();
        assert_eq!(body["sms"]["successRate"], 0.0);
        assert_eq!(body["apiLatency"]["openmeteo"]["count"], 0);
        assert!(body["uptime"].as_i64().unwrap() >= 0);
    }

    #[tokio::test]
    async fn alert_history_empty_when_store_degraded() {
        let server = test_server().await;
        let resp = server.get("/alerts/history").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn alert_history_accepts_filters() {
        let server = test_server().await;
        let resp = server
            .get("/alerts/history")
            .add_query_param("gardenId", "g1")
            .add_query_param("alertType", "HIGH_TEMPERATURE")
            .add_query_param("limit", "10")
            .await;
        resp.assert_status_ok();
    }

    #[tokio::test]
    async fn openapi_spec_is_served() {
        let server = test_server().await;
        let resp = server.get("/api-docs/openapi.json").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["info"]["title"], "Garden Watch API");
    }
}
