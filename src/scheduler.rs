use std::{sync::Arc, time::Duration};

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::alerts::AlertEngine;
use crate::backend::PlantsClient;
use crate::channels::{broadcast::BroadcastChannel, history::HistoryStore, sms::SmsChannel};
use crate::metrics::MetricsService;
use crate::models::{Alert, Garden};

/// Drives the alert pipeline: a recurring evaluation round over all
/// configured gardens, each garden dispatched in parallel, each emitted
/// alert fanned out to the three sinks in priority order.
///
/// The loop never terminates on downstream errors; every failure is
/// contained at the garden or sink where it happened.
pub struct Scheduler {
    gardens: Vec<Garden>,
    engine: AlertEngine,
    plants: PlantsClient,
    sms: SmsChannel,
    broadcast: BroadcastChannel,
    history: Arc<HistoryStore>,
    metrics: MetricsService,
    poll_interval: Duration,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gardens: Vec<Garden>,
        engine: AlertEngine,
        plants: PlantsClient,
        sms: SmsChannel,
        broadcast: BroadcastChannel,
        history: Arc<HistoryStore>,
        metrics: MetricsService,
        poll_interval: Duration,
    ) -> Self {
        Self {
            gardens,
            engine,
            plants,
            sms,
            broadcast,
            history,
            metrics,
            poll_interval,
        }
    }

    /// Run evaluation rounds forever. Spawn this via `tokio::spawn`. The
    /// first round starts immediately; each round is awaited before the
    /// next tick is taken, so back-to-back rounds never interleave.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            gardens = self.gardens.len(),
            interval_secs = self.poll_interval.as_secs(),
            "Evaluation loop started"
        );

        loop {
            ticker.tick().await;
            Arc::clone(&self).run_round().await;
        }
    }

    /// One evaluation round over all gardens, dispatched in parallel.
    pub async fn run_round(self: Arc<Self>) {
        let started = tokio::time::Instant::now();
        let mut set = JoinSet::new();
        for garden in self.gardens.clone() {
            let scheduler = Arc::clone(&self);
            set.spawn(async move { scheduler.process_garden(&garden).await });
        }

        let mut alerts = 0usize;
        let mut failed = 0usize;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(n) => alerts += n,
                Err(e) => {
                    failed += 1;
                    error!(error = %e, "Garden evaluation task panicked");
                }
            }
        }

        info!(
            gardens = self.gardens.len(),
            failed,
            alerts,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Evaluation round finished"
        );
    }

    /// Evaluate one garden and fan out its alerts. Never propagates;
    /// returns the number of alerts emitted.
    async fn process_garden(&self, garden: &Garden) -> usize {
        let alerts = self.engine.evaluate_garden(garden).await;
        for alert in &alerts {
            self.metrics.record_alert(alert.alert_type).await;
            self.dispatch_alert(alert).await;
        }
        alerts.len()
    }

    /// Push one alert through the sinks sequentially in priority order:
    /// SMS first, broadcast second, history third. Each sink has its own
    /// error boundary; none can prevent the ones after it.
    pub(crate) async fn dispatch_alert(&self, alert: &Alert) {
        if self.sms.is_enabled() {
            match self.plants.fetch_user(alert.user_id).await {
                Ok(user) => {
                    if user.phone_number.as_deref().is_some_and(|p| !p.is_empty()) {
                        if self.sms.send_alert(alert, &user).await {
                            self.metrics.record_sms_sent().await;
                        } else {
                            self.metrics.record_sms_failed().await;
                        }
                    } else {
                        info!(alert_id = %alert.alert_id, user_id = user.id, "No phone number on file, SMS skipped");
                    }
                }
                Err(e) => {
                    warn!(alert_id = %alert.alert_id, error = %e, "User lookup failed, SMS not sent");
                    self.metrics.record_sms_failed().await;
                }
            }
        } else {
            debug!(alert_id = %alert.alert_id, "SMS channel disabled, skipped");
        }

        self.broadcast.broadcast(alert).await;

        if !self.history.save_alert(alert).await {
            debug!(alert_id = %alert.alert_id, "Alert not persisted");
        }
    }
}
