use std::sync::Arc;
use tempfile::TempDir;
use vnc_orchestrator::access::AccessAction;
use vnc_orchestrator::config::Config;
use vnc_orchestrator::orchestrator::Orchestrator;
use vnc_orchestrator::runtime::fake::FakeRuntime;
use vnc_orchestrator::runtime::{ContainerRuntime, CreateOptions};

fn base_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.state.state_file = dir.path().join("state.json").to_string_lossy().to_string();
    config.vnc.port_range_min = 5000;
    config.vnc.port_range_max = 5001;
    config.pool.warm_pool_size = 0;
    config
}

#[tokio::test]
async fn startup_adopts_orphaned_containers_before_serving_traffic() {
    let dir = TempDir::new().unwrap();
    let config = base_config(&dir);

    let runtime = FakeRuntime::new();
    runtime
        .create(CreateOptions {
            name: "vnc_12345",
            host_port: 5000,
            image: "img",
            container_port: 6080,
            env: vec![],
            network: None,
            network_subnet: None,
        })
        .await
        .unwrap();
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(runtime);

    let orchestrator = Orchestrator::start(config, runtime).await;

    let record = orchestrator.store.find_by_client("12345").await;
    assert!(record.is_some());
    assert_eq!(record.unwrap().port, 5000);

    // The orchestrator now reuses the adopted container rather than
    // creating a second one for the same client id.
    let result = orchestrator.access.access("12345", None, None).await.unwrap();
    assert_eq!(result.action, AccessAction::Reused);
}

#[tokio::test]
async fn fresh_create_then_capacity_recycle_end_to_end() {
    let dir = TempDir::new().unwrap();
    let mut config = base_config(&dir);
    config.vnc.port_range_min = 5000;
    config.vnc.port_range_max = 5000;

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(FakeRuntime::new());
    let orchestrator = Orchestrator::start(config, runtime).await;

    let alice = orchestrator.access.access("alice", None, None).await.unwrap();
    assert_eq!(alice.action, AccessAction::Created);
    assert_eq!(alice.port, 5000);

    // Single-slot range: bob's access must recycle alice's assignment.
    let bob = orchestrator.access.access("bob", None, None).await.unwrap();
    assert_eq!(bob.action, AccessAction::Created);
    assert_eq!(bob.port, 5000);
    assert!(orchestrator.store.find_by_client("alice").await.is_none());
}

#[tokio::test]
async fn shutdown_stops_the_reaper_without_panicking() {
    let dir = TempDir::new().unwrap();
    let config = base_config(&dir);
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(FakeRuntime::new());
    let orchestrator = Orchestrator::start(config, runtime).await;

    orchestrator.access.access("alice", None, None).await.unwrap();
    orchestrator.shutdown().await;

    // The store survives shutdown untouched; the reconciler is the backstop
    // for anything left running, not the shutdown path itself.
    assert!(orchestrator.store.find_by_client("alice").await.is_some());
}
