use super::{ContainerRuntime, CreateOptions, CreatedContainer};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory stand-in for the Docker adapter. Backs the orchestration test
/// suite so it never needs a live daemon.
pub struct FakeRuntime {
    containers: Mutex<HashMap<String, CreatedContainer>>,
    counter: AtomicU64,
    pub unhealthy: Mutex<Vec<String>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            containers: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
            unhealthy: Mutex::new(Vec::new()),
        }
    }

    pub fn mark_unhealthy(&self, container_id: &str) {
        self.unhealthy.lock().unwrap().push(container_id.to_string());
    }

    pub fn container_count(&self) -> usize {
        self.containers.lock().unwrap().len()
    }
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create(&self, opts: CreateOptions<'_>) -> anyhow::Result<CreatedContainer> {
        let id = format!("fake-{}", self.counter.fetch_add(1, Ordering::SeqCst));
        let created = CreatedContainer {
            id: id.clone(),
            name: opts.name.to_string(),
            port: opts.host_port,
        };
        self.containers
            .lock()
            .unwrap()
            .insert(opts.name.to_string(), created.clone());
        Ok(created)
    }

    async fn remove(&self, container_id: &str) {
        self.containers
            .lock()
            .unwrap()
            .retain(|_, c| c.id != container_id);
    }

    async fn is_healthy(&self, container_id: &str) -> bool {
        !self
            .unhealthy
            .lock()
            .unwrap()
            .iter()
            .any(|id| id == container_id)
    }

    async fn list_orchestrated(&self) -> HashMap<String, CreatedContainer> {
        self.containers.lock().unwrap().clone()
    }

    async fn wait_ready(&self, _container_id: &str, _timeout: Duration) -> bool {
        true
    }
}
