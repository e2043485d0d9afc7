mod alerts;
mod api;
mod backend;
mod channels;
mod config;
mod metrics;
mod models;
mod openmeteo;
mod plant_cache;
mod scheduler;
mod sensitivity;
mod twilio;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{
    alerts::AlertEngine,
    backend::PlantsClient,
    channels::{broadcast::BroadcastChannel, history::HistoryStore, sms::SmsChannel},
    config::Config,
    metrics::MetricsService,
    openmeteo::WeatherClient,
    plant_cache::PlantCache,
    scheduler::Scheduler,
    sensitivity::SensitivityRegistry,
    twilio::TwilioClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent — env vars may be set externally)
    let _ = dotenvy::dotenv();

    // Initialise tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    // Load config; file or invariant problems here abort startup.
    let config = Config::from_env()?;
    let gardens = config::load_gardens(&config.gardens_path)?;
    let profiles = config::load_profiles(&config.profiles_path)?;
    let registry = Arc::new(SensitivityRegistry::new(profiles)?);
    info!(gardens = gardens.len(), "Configuration loaded");

    // Shared components
    let metrics = MetricsService::new();
    let weather = WeatherClient::new(config.open_meteo_base_url.clone(), Some(metrics.clone()));
    let plants = PlantsClient::new(config.backend_url.clone(), Some(metrics.clone()));
    let cache = PlantCache::new(plants.clone());
    let broadcast = BroadcastChannel::new();
    let history = Arc::new(HistoryStore::connect(config.mongo_url.as_deref()).await);

    let twilio = config.twilio.as_ref().and_then(|t| {
        TwilioClient::new(t, config.twilio_base_url.clone())
            .map_err(|e| warn!(error = %e, "Twilio client init failed, SMS disabled"))
            .ok()
    });
    let sms = SmsChannel::new(twilio);
    let sms_enabled = sms.is_enabled();

    // Warm the plant cache for every garden owner, then keep it fresh.
    let user_ids: Vec<i64> = {
        let mut ids: Vec<i64> = gardens.iter().map(|g| g.user_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    };
    cache.warm_up(&user_ids).await;
    cache
        .start_periodic_refresh(
            user_ids,
            Duration::from_secs(config.cache_refresh_interval_secs),
        )
        .await;

    // Spawn the evaluation loop; its first round runs immediately.
    let engine = AlertEngine::new(weather, cache.clone(), registry);
    let scheduler = Arc::new(Scheduler::new(
        gardens,
        engine,
        plants,
        sms,
        broadcast.clone(),
        Arc::clone(&history),
        metrics.clone(),
        Duration::from_secs(config.poll_interval_secs),
    ));
    let scheduler_task = tokio::spawn(scheduler.run());

    // Start HTTP server
    let state = api::AppState {
        http: reqwest::Client::new(),
        backend_url: config.backend_url.clone(),
        open_meteo_base_url: config.open_meteo_base_url.clone(),
        sms_enabled,
        metrics,
        broadcast,
        history,
    };
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the recurring work; in-flight sink calls end with the process.
    scheduler_task.abort();
    cache.stop().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
