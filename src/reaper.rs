use crate::runtime::ContainerRuntime;
use crate::store::StateStore;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Periodically force-removes containers whose assignment has gone idle
/// beyond the configured threshold, pool containers included.
pub struct IdleReaper {
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl IdleReaper {
    /// Spawn the periodic tick loop. `MissedTickBehavior::Delay` means a
    /// slow tick (e.g. a large store) pushes the schedule out rather than
    /// bursting catch-up ticks.
    pub fn spawn(
        store: Arc<StateStore>,
        runtime: Arc<dyn ContainerRuntime>,
        period: Duration,
        idle_timeout_hours: i64,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                reap_once(&store, runtime.as_ref(), idle_timeout_hours).await;
            }
        });

        Self {
            handle: std::sync::Mutex::new(Some(handle)),
        }
    }

    /// Cancel the tick loop. Any tick already in flight runs to completion.
    /// Takes `&self` (not `&mut self`) so the reaper can be cancelled from
    /// behind a shared `Arc` on the graceful-shutdown path.
    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl Drop for IdleReaper {
    fn drop(&mut self) {
        IdleReaper::stop(self);
    }
}

async fn reap_once(store: &StateStore, runtime: &dyn ContainerRuntime, idle_timeout_hours: i64) {
    let cutoff = Utc::now() - ChronoDuration::hours(idle_timeout_hours);
    let snapshot = store.load_records().await;

    let mut reaped = 0;
    for record in snapshot {
        if record.last_accessed_at < cutoff {
            info!(
                client_id = record.client_id,
                container_id = record.container_id,
                last_accessed_at = %record.last_accessed_at,
                "reaping idle container"
            );
            runtime.remove(&record.container_id).await;
            // Deleting by container_id, not client_id, matters for pool
            // records: several share the sentinel client_id, and removing
            // by that id would collapse every sibling pool record in one
            // call even though only this one went idle.
            if let Err(e) = store.remove_by_container_id(&record.container_id).await {
                warn!(client_id = record.client_id, error = %e, "failed to persist reap");
            } else {
                reaped += 1;
            }
        }
    }

    if reaped > 0 {
        info!(reaped, "idle reaper tick complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fake::FakeRuntime;
    use crate::store::POOL_CLIENT_ID;
    use tempfile::TempDir;

    #[tokio::test]
    async fn reaps_only_records_past_the_cutoff() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(dir.path().join("state.json")).await;
        let runtime = FakeRuntime::new();

        store
            .add_record("alice", "c1", "vnc_alice", 5000, None, None)
            .await
            .unwrap();
        store
            .add_record("bob", "c2", "vnc_bob", 5001, None, None)
            .await
            .unwrap();

        // Force alice's timestamp into the past by touching then
        // overwriting via a fresh add_record is not representative of real
        // idling, so we directly rewrite the persisted records here.
        let mut records = store.load_records().await;
        for record in records.iter_mut() {
            if record.client_id == "alice" {
                record.last_accessed_at = Utc::now() - ChronoDuration::hours(9);
            }
        }
        store.save_records(records).await.unwrap();

        reap_once(&store, &runtime, 8).await;

        assert!(store.find_by_client("alice").await.is_none());
        assert!(store.find_by_client("bob").await.is_some());
    }

    #[tokio::test]
    async fn pool_records_are_reaped_like_any_other() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(dir.path().join("state.json")).await;
        let runtime = FakeRuntime::new();

        store
            .add_record(POOL_CLIENT_ID, "p1", "vnc_pool_0", 5000, None, None)
            .await
            .unwrap();

        let mut records = store.load_records().await;
        records[0].last_accessed_at = Utc::now() - ChronoDuration::hours(9);
        store.save_records(records).await.unwrap();

        reap_once(&store, &runtime, 8).await;

        assert!(store.find_unassigned().await.is_empty());
    }

    #[tokio::test]
    async fn reaping_one_idle_pool_record_spares_its_sibling() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(dir.path().join("state.json")).await;
        let runtime = FakeRuntime::new();

        store
            .add_record(POOL_CLIENT_ID, "p1", "vnc_pool_0", 5000, None, None)
            .await
            .unwrap();
        store
            .add_record(POOL_CLIENT_ID, "p2", "vnc_pool_1", 5001, None, None)
            .await
            .unwrap();

        let mut records = store.load_records().await;
        for record in records.iter_mut() {
            if record.container_id == "p1" {
                record.last_accessed_at = Utc::now() - ChronoDuration::hours(9);
            }
        }
        store.save_records(records).await.unwrap();

        reap_once(&store, &runtime, 8).await;

        let remaining = store.find_unassigned().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].container_id, "p2");
    }
}
