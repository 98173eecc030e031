use std::sync::Arc;
use tempfile::TempDir;
use vnc_orchestrator::config::Config;
use vnc_orchestrator::runtime::fake::FakeRuntime;
use vnc_orchestrator::runtime::ContainerRuntime;
use vnc_orchestrator::store::{StateStore, POOL_CLIENT_ID};
use vnc_orchestrator::warm_pool::WarmPoolManager;

fn pool_config(dir: &TempDir, size: usize) -> Config {
    let mut config = Config::default();
    config.state.state_file = dir.path().join("state.json").to_string_lossy().to_string();
    config.vnc.port_range_min = 5000;
    config.vnc.port_range_max = 5003;
    config.pool.warm_pool_size = size;
    config
}

#[tokio::test]
async fn two_sequential_replenishes_settle_at_target() {
    let dir = TempDir::new().unwrap();
    let config = pool_config(&dir, 2);
    let store = Arc::new(StateStore::open(&config.state.state_file).await);
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(FakeRuntime::new());
    let pool = Arc::new(WarmPoolManager::new(store.clone(), runtime, &config));

    pool.replenish();
    pool.wait_idle(std::time::Duration::from_secs(5)).await;
    pool.replenish();
    pool.wait_idle(std::time::Duration::from_secs(5)).await;

    let unassigned = store.find_unassigned().await;
    assert_eq!(unassigned.len(), 2);
}

#[tokio::test]
async fn replenish_is_a_noop_when_target_is_zero() {
    let dir = TempDir::new().unwrap();
    let config = pool_config(&dir, 0);
    let store = Arc::new(StateStore::open(&config.state.state_file).await);
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(FakeRuntime::new());
    let pool = Arc::new(WarmPoolManager::new(store.clone(), runtime, &config));

    pool.replenish();
    pool.wait_idle(std::time::Duration::from_secs(1)).await;

    assert!(store.find_unassigned().await.is_empty());
}

#[tokio::test]
async fn replenish_stops_when_port_range_is_exhausted() {
    let dir = TempDir::new().unwrap();
    let config = pool_config(&dir, 10);
    let store = Arc::new(StateStore::open(&config.state.state_file).await);
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(FakeRuntime::new());
    let pool = Arc::new(WarmPoolManager::new(store.clone(), runtime, &config));

    pool.replenish();
    pool.wait_idle(std::time::Duration::from_secs(5)).await;

    // Only 4 slots (5000..=5003) are available, so the pool can never reach
    // its target of 10; the manager must stop early rather than fail.
    assert_eq!(store.find_unassigned().await.len(), 4);
    assert!(store
        .used_ports()
        .await
        .iter()
        .all(|p| (5000..=5003).contains(p)));
}

#[tokio::test]
async fn pool_records_use_the_sentinel_client_id() {
    let dir = TempDir::new().unwrap();
    let config = pool_config(&dir, 1);
    let store = Arc::new(StateStore::open(&config.state.state_file).await);
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(FakeRuntime::new());
    let pool = Arc::new(WarmPoolManager::new(store.clone(), runtime, &config));

    pool.replenish();
    pool.wait_idle(std::time::Duration::from_secs(5)).await;

    let records = store.load_records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].client_id, POOL_CLIENT_ID);
}
