use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::backend::PlantsClient;
use crate::models::Plant;

/// Entries older than this are stale and no longer served by fresh reads.
const TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct CacheEntry {
    plants: Vec<Plant>,
    last_refreshed: Instant,
}

/// Per-user plant lists with TTL-based staleness and a scheduled refresh.
///
/// Wrapped in `Arc` so it can be cheaply cloned and shared between the
/// refresh schedule and the evaluation path; reads and writes may race
/// freely across tasks.
///
/// Staleness has two distinct accessors: [`get`](Self::get) serves only
/// fresh entries (the alert engine uses this and treats a miss as "no
/// plants"), while [`get_or_stale`](Self::get_or_stale) also serves expired
/// entries and backs the last-resort fallback in [`refresh`](Self::refresh).
#[derive(Clone)]
pub struct PlantCache {
    inner: Arc<RwLock<HashMap<i64, CacheEntry>>>,
    client: PlantsClient,
    refresh_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl PlantCache {
    pub fn new(client: PlantsClient) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            client,
            refresh_task: Arc::new(Mutex::new(None)),
        }
    }

    /// Return the cached plants for `user_id` unless the entry is stale.
    pub async fn get(&self, user_id: i64) -> Option<Vec<Plant>> {
        self.inner
            .read()
            .await
            .get(&user_id)
            .filter(|entry| entry.last_refreshed.elapsed() <= TTL)
            .map(|entry| entry.plants.clone())
    }

    /// Return the cached plants for `user_id` regardless of age.
    pub async fn get_or_stale(&self, user_id: i64) -> Option<Vec<Plant>> {
        self.inner
            .read()
            .await
            .get(&user_id)
            .map(|entry| entry.plants.clone())
    }

    /// Replace the entry for `user_id`, stamping it as refreshed now.
    pub async fn set(&self, user_id: i64, plants: Vec<Plant>) {
        self.inner.write().await.insert(
            user_id,
            CacheEntry {
                plants,
                last_refreshed: Instant::now(),
            },
        );
    }

    /// Fetch the user's plants from the backend and cache them.
    ///
    /// When the fetch fails but a prior entry exists (even a stale one),
    /// the prior plants are returned instead of the error; the error only
    /// propagates when there is nothing to fall back to.
    pub async fn refresh(&self, user_id: i64) -> anyhow::Result<Vec<Plant>> {
        match self.client.fetch_user_plants(user_id).await {
            Ok(plants) => {
                self.set(user_id, plants.clone()).await;
                Ok(plants)
            }
            Err(e) => match self.get_or_stale(user_id).await {
                Some(prior) => {
                    warn!(user_id, error = %e, "Plant refresh failed, serving prior entry");
                    Ok(prior)
                }
                None => Err(e.into()),
            },
        }
    }

    /// Refresh all `user_ids` in parallel. Individual failures are logged
    /// and swallowed so the remaining warm-ups proceed.
    pub async fn warm_up(&self, user_ids: &[i64]) {
        let mut set = tokio::task::JoinSet::new();
        for &user_id in user_ids {
            let cache = self.clone();
            set.spawn(async move { (user_id, cache.refresh(user_id).await) });
        }
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((user_id, Ok(plants))) => {
                    info!(user_id, plants = plants.len(), "Plant cache warmed");
                }
                Ok((user_id, Err(e))) => {
                    warn!(user_id, error = %e, "Plant cache warm-up failed");
                }
                Err(e) => warn!(error = %e, "Plant cache warm-up task panicked"),
            }
        }
    }

    /// Run [`warm_up`](Self::warm_up) on a recurring schedule. At most one
    /// schedule is active; a second call while one is running is ignored.
    pub async fn start_periodic_refresh(&self, user_ids: Vec<i64>, interval: Duration) {
        let mut guard = self.refresh_task.lock().await;
        if guard.as_ref().is_some_and(|h| !h.is_finished()) {
            warn!("Periodic plant refresh already running, ignoring");
            return;
        }

        let cache = self.clone();
        let handle = tokio::spawn(async move {
            // First tick lands one full interval out; startup warm-up is
            // the caller's responsibility.
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            info!(interval_secs = interval.as_secs(), users = user_ids.len(), "Plant refresh schedule started");
            loop {
                ticker.tick().await;
                cache.warm_up(&user_ids).await;
            }
        });
        *guard = Some(handle);
    }

    /// Stop the periodic refresh schedule, if one is running.
    pub async fn stop(&self) {
        if let Some(handle) = self.refresh_task.lock().await.take() {
            handle.abort();
            info!("Plant refresh schedule stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plant(user_id: i64, name: &str, plant_type: &str) -> Plant {
        Plant {
            id: 1,
            user_id,
            name: name.to_owned(),
            plant_type: plant_type.to_owned(),
        }
    }

    fn unreachable_client() -> PlantsClient {
        PlantsClient::new("http://127.0.0.1:1".into(), None)
    }

    #[tokio::test]
    async fn empty_cache_misses() {
        let cache = PlantCache::new(unreachable_client());
        assert!(cache.get(1).await.is_none());
        assert!(cache.get_or_stale(1).await.is_none());
    }

    #[tokio::test]
    async fn set_then_get_returns_entry() {
        let cache = PlantCache::new(unreachable_client());
        cache.set(1, vec![plant(1, "T1", "tomato")]).await;

        let plants = cache.get(1).await.unwrap();
        assert_eq!(plants.len(), 1);
        assert_eq!(plants[0].name, "T1");
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = PlantCache::new(unreachable_client());
        cache.set(1, vec![plant(1, "T1", "tomato")]).await;

        tokio::time::advance(TTL - Duration::from_secs(1)).await;
        assert!(cache.get(1).await.is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get(1).await.is_none());
        // Stale accessor still serves it.
        assert!(cache.get_or_stale(1).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_failure_falls_back_to_stale_entry() {
        let cache = PlantCache::new(unreachable_client());
        cache.set(1, vec![plant(1, "T1", "tomato")]).await;
        tokio::time::advance(TTL + Duration::from_secs(60)).await;

        // Fetch fails (unreachable backend), prior stale entry is served.
        let plants = cache.refresh(1).await.unwrap();
        assert_eq!(plants[0].name, "T1");
        // The fresh read still reports a miss.
        assert!(cache.get(1).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_failure_without_prior_entry_propagates() {
        let cache = PlantCache::new(unreachable_client());
        assert!(cache.refresh(1).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn warm_up_swallows_individual_failures() {
        let cache = PlantCache::new(unreachable_client());
        // Must not panic or propagate even though every refresh fails.
        cache.warm_up(&[1, 2, 3]).await;
        assert!(cache.get(1).await.is_none());
    }

    #[tokio::test]
    async fn at_most_one_refresh_schedule() {
        let cache = PlantCache::new(unreachable_client());
        cache.start_periodic_refresh(vec![1], Duration::from_secs(3600)).await;
        cache.start_periodic_refresh(vec![1], Duration::from_secs(3600)).await;
        cache.stop().await;
        // After stop, a new schedule may start again.
        cache.start_periodic_refresh(vec![1], Duration::from_secs(3600)).await;
        cache.stop().await;
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let cache = PlantCache::new(unreachable_client());
        let clone = cache.clone();
        cache.set(7, vec![plant(7, "L1", "lettuce")]).await;
        assert!(clone.get(7).await.is_some());
    }
}
