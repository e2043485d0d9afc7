pub mod dto;
pub mod handlers;

use std::sync::Arc;

use axum::{routing::get, Router};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::channels::{broadcast::BroadcastChannel, history::HistoryStore};
use crate::metrics::MetricsService;

use handlers::ApiDoc;

/// Shared state for the operational HTTP surface.
#[derive(Clone)]
pub struct AppState {
    /// Client for the health probes against the backend and Open-Meteo.
    pub http: reqwest::Client,
    pub backend_url: String,
    pub open_meteo_base_url: String,
    pub sms_enabled: bool,
    pub metrics: MetricsService,
    pub broadcast: BroadcastChannel,
    pub history: Arc<HistoryStore>,
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/alerts/history", get(handlers::alert_history))
        .route("/ws", get(handlers::ws_upgrade))
        .with_state(state)
        .split_for_parts();

    router.route(
        "/api-docs/openapi.json",
        get(move || async move { axum::Json(api) }),
    )
}
