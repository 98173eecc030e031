use crate::runtime::ContainerRuntime;
use crate::store::{ContainerRecord, StateStore, POOL_CLIENT_ID};
use chrono::Utc;
use std::collections::HashSet;
use tracing::{info, warn};

/// Runs once at startup, before the HTTP listener opens, to reconcile the
/// persisted store against the live set of containers: duplicates and dead
/// records are dropped, orphaned containers the runtime already knows about
/// are adopted.
pub async fn reconcile(store: &StateStore, runtime: &dyn ContainerRuntime) {
    let snapshot = store.load_records().await;
    let mut live = runtime.list_orchestrated().await;

    let mut cleaned: Vec<ContainerRecord> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for record in snapshot {
        let is_pool = record.client_id == POOL_CLIENT_ID;

        if !is_pool && seen.contains(&record.client_id) {
            warn!(client_id = record.client_id, "dropping duplicate record");
            runtime.remove(&record.container_id).await;
            continue;
        }

        if runtime.is_healthy(&record.container_id).await {
            live.remove(&record.container_name);
            if !is_pool {
                seen.insert(record.client_id.clone());
            }
            cleaned.push(record);
        } else {
            warn!(
                client_id = record.client_id,
                container_id = record.container_id,
                "dropping stale record for dead container"
            );
            runtime.remove(&record.container_id).await;
        }
    }

    for (name, info) in live {
        if !name.starts_with("vnc_") {
            continue;
        }

        let client_id = if name.starts_with("vnc_pool_") {
            POOL_CLIENT_ID.to_string()
        } else {
            let candidate = name.trim_start_matches("vnc_").to_string();
            if seen.contains(&candidate) {
                warn!(name, "orphan container's client id already claimed, skipping adoption");
                continue;
            }
            candidate
        };

        info!(name, client_id, "adopting orphaned container");
        let now = Utc::now();
        cleaned.push(ContainerRecord {
            client_id: client_id.clone(),
            container_id: info.id,
            container_name: name,
            port: info.port,
            created_at: now,
            last_accessed_at: now,
            width: None,
            height: None,
        });
        if client_id != POOL_CLIENT_ID {
            seen.insert(client_id);
        }
    }

    let count = cleaned.len();
    if let Err(e) = store.save_records(cleaned).await {
        warn!(error = %e, "failed to persist reconciled state");
    } else {
        info!(count, "startup reconciliation complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fake::FakeRuntime;
    use crate::runtime::CreateOptions;
    use tempfile::TempDir;

    #[tokio::test]
    async fn adopts_orphaned_containers() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(dir.path().join("state.json")).await;
        let runtime = FakeRuntime::new();

        runtime
            .create(CreateOptions {
                name: "vnc_pool_0",
                host_port: 5002,
                image: "img",
                container_port: 6080,
                env: vec![],
                network: None,
                network_subnet: None,
            })
            .await
            .unwrap();
        runtime
            .create(CreateOptions {
                name: "vnc_12345",
                host_port: 5003,
                image: "img",
                container_port: 6080,
                env: vec![],
                network: None,
                network_subnet: None,
            })
            .await
            .unwrap();

        reconcile(&store, &runtime).await;

        let records = store.load_records().await;
        assert_eq!(records.len(), 2);
        assert!(records.iter().any(|r| r.client_id == POOL_CLIENT_ID));
        assert!(records.iter().any(|r| r.client_id == "12345"));
    }

    #[tokio::test]
    async fn drops_stale_record_for_dead_container() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(dir.path().join("state.json")).await;
        let runtime = FakeRuntime::new();

        store
            .add_record("alice", "ghost", "vnc_alice", 5000, None, None)
            .await
            .unwrap();
        runtime.mark_unhealthy("ghost");

        reconcile(&store, &runtime).await;

        assert!(store.find_by_client("alice").await.is_none());
    }

    #[tokio::test]
    async fn drops_duplicate_non_pool_records() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(dir.path().join("state.json")).await;
        let runtime = FakeRuntime::new();

        let c1 = runtime
            .create(CreateOptions {
                name: "vnc_alice",
                host_port: 5000,
                image: "img",
                container_port: 6080,
                env: vec![],
                network: None,
                network_subnet: None,
            })
            .await
            .unwrap();
        let c2 = runtime
            .create(CreateOptions {
                name: "vnc_alice_dup",
                host_port: 5001,
                image: "img",
                container_port: 6080,
                env: vec![],
                network: None,
                network_subnet: None,
            })
            .await
            .unwrap();

        let mut records = vec![
            ContainerRecord {
                client_id: "alice".to_string(),
                container_id: c1.id.clone(),
                container_name: c1.name.clone(),
                port: 5000,
                created_at: Utc::now(),
                last_accessed_at: Utc::now(),
                width: None,
                height: None,
            },
            ContainerRecord {
                client_id: "alice".to_string(),
                container_id: c2.id.clone(),
                container_name: c2.name.clone(),
                port: 5001,
                created_at: Utc::now(),
                last_accessed_at: Utc::now(),
                width: None,
                height: None,
            },
        ];
        store.save_records(std::mem::take(&mut records)).await.unwrap();

        reconcile(&store, &runtime).await;

        let records = store.load_records().await;
        assert_eq!(records.iter().filter(|r| r.client_id == "alice").count(), 1);
    }
}
