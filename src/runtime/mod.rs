mod docker;

pub mod fake;

pub use docker::DockerRuntime;

use async_trait::async_trait;
use std::collections::HashMap;

/// Result of creating (or inspecting) an orchestrated container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedContainer {
    pub id: String,
    pub name: String,
    pub port: u16,
}

/// Options for creating a new orchestrated container.
pub struct CreateOptions<'a> {
    pub name: &'a str,
    pub host_port: u16,
    pub image: &'a str,
    pub container_port: u16,
    pub env: Vec<(String, String)>,
    pub network: Option<&'a str>,
    pub network_subnet: Option<&'a str>,
}

/// Opaque capability set over the container runtime. Implemented against
/// the Docker Engine API; a fake implementation backs the orchestration
/// test suite so it never needs a live daemon.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn create(&self, opts: CreateOptions<'_>) -> anyhow::Result<CreatedContainer>;

    async fn remove(&self, container_id: &str);

    async fn is_healthy(&self, container_id: &str) -> bool;

    /// Every running container whose name begins with `vnc_`, keyed by name.
    async fn list_orchestrated(&self) -> HashMap<String, CreatedContainer>;

    /// Poll health until `healthy`, `unhealthy`, removal, or `timeout`
    /// elapses. A timeout resolves to `false` but is not treated as fatal by
    /// callers.
    async fn wait_ready(&self, container_id: &str, timeout: std::time::Duration) -> bool;
}
