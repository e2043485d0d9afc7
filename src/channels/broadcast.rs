use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use serde::Serialize;
use tokio::sync::{mpsc::UnboundedSender, RwLock};
use tracing::{debug, info, warn};

use crate::models::Alert;

/// Message pushed to every live subscriber on broadcast.
#[derive(Serialize)]
struct BroadcastMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: &'a Alert,
}

/// Fan-out to connected real-time subscribers.
///
/// Each subscriber is an unbounded sender registered on connect; the
/// WebSocket task on the other end forwards messages to the socket. A
/// subscriber whose channel is gone is dropped from the set on the next
/// broadcast without affecting the others. Zero subscribers is the normal
/// idle state, not an error.
#[derive(Clone, Default)]
pub struct BroadcastChannel {
    subscribers: Arc<RwLock<HashMap<u64, UnboundedSender<String>>>>,
    next_id: Arc<AtomicU64>,
}

impl BroadcastChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber, returning its handle for `unsubscribe`.
    pub async fn subscribe(&self, sender: UnboundedSender<String>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().await.insert(id, sender);
        info!(subscriber = id, "Subscriber connected");
        id
    }

    pub async fn unsubscribe(&self, id: u64) {
        if self.subscribers.write().await.remove(&id).is_some() {
            info!(subscriber = id, "Subscriber disconnected");
        }
    }

    #[allow(dead_code)]
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Serialize `alert` once and push it to every subscriber. Subscribers
    /// whose send fails are evicted; the rest still receive the message.
    pub async fn broadcast(&self, alert: &Alert) {
        let message = match serde_json::to_string(&BroadcastMessage {
            kind: "WEATHER_ALERT",
            data: alert,
        }) {
            Ok(m) => m,
            Err(e) => {
                warn!(alert_id = %alert.alert_id, error = %e, "Failed to serialize broadcast message");
                return;
            }
        };

        let mut dead = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            if subscribers.is_empty() {
                debug!(alert_id = %alert.alert_id, "No subscribers, broadcast is a no-op");
                return;
            }
            for (&id, sender) in subscribers.iter() {
                if sender.send(message.clone()).is_err() {
                    dead.push(id);
                }
            }
        }

        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in dead {
                subscribers.remove(&id);
                warn!(subscriber = id, "Dropped unreachable subscriber");
            }
        }
    }
}
