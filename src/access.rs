use crate::config::{Config, VncConfig};
use crate::error::{OrchestratorError, Result};
use crate::runtime::{ContainerRuntime, CreateOptions};
use crate::store::{StateStore, POOL_CLIENT_ID};
use crate::warm_pool::WarmPoolManager;
use crate::allocator::PortAllocator;
use std::sync::Arc;
use tracing::{info, warn};

/// How a request for a container was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessAction {
    Reused,
    Pool,
    Created,
}

impl AccessAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessAction::Reused => "reused",
            AccessAction::Pool => "pool",
            AccessAction::Created => "created",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccessResult {
    pub action: AccessAction,
    pub client_id: String,
    pub port: u16,
    pub url: String,
}

/// Implements the main access flow: reuse a healthy assignment, else claim
/// from the warm pool, else allocate a fresh port (recycling the oldest
/// idle assignment if the range is exhausted), else fail.
pub struct AccessService {
    store: Arc<StateStore>,
    runtime: Arc<dyn ContainerRuntime>,
    allocator: PortAllocator,
    vnc: VncConfig,
    vnc_host: String,
    pool: Arc<WarmPoolManager>,
}

impl AccessService {
    pub fn new(
        store: Arc<StateStore>,
        runtime: Arc<dyn ContainerRuntime>,
        pool: Arc<WarmPoolManager>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            runtime,
            allocator: PortAllocator::new(config.vnc.port_range_min, config.vnc.port_range_max),
            vnc: config.vnc.clone(),
            vnc_host: config.server.vnc_host.clone(),
            pool,
        }
    }

    fn url_for(&self, port: u16) -> String {
        format!("http://{}:{}", self.vnc_host, port)
    }

    pub async fn access(
        &self,
        client_id: &str,
        width: Option<String>,
        height: Option<String>,
    ) -> Result<AccessResult> {
        if client_id.is_empty() {
            return Err(OrchestratorError::BadRequest);
        }

        // 1. Lookup: reuse a healthy existing assignment.
        if let Some(record) = self.store.find_by_client(client_id).await {
            if self.runtime.is_healthy(&record.container_id).await {
                self.store.touch_client(client_id).await?;
                info!(client_id, port = record.port, "reusing existing container");
                return Ok(AccessResult {
                    action: AccessAction::Reused,
                    client_id: client_id.to_string(),
                    port: record.port,
                    url: self.url_for(record.port),
                });
            }

            warn!(client_id, container_id = record.container_id, "existing container is dead, removing");
            self.runtime.remove(&record.container_id).await;
            self.store.remove_by_client(client_id).await?;
        }

        // 2. Pool claim.
        if let Some(record) = self
            .store
            .claim_pool_container(client_id, width.clone(), height.clone())
            .await?
        {
            if self.runtime.is_healthy(&record.container_id).await {
                info!(client_id, port = record.port, "claimed warm pool container");
                self.pool.replenish();
                return Ok(AccessResult {
                    action: AccessAction::Pool,
                    client_id: client_id.to_string(),
                    port: record.port,
                    url: self.url_for(record.port),
                });
            }

            warn!(client_id, container_id = record.container_id, "claimed pool container is dead, removing");
            self.runtime.remove(&record.container_id).await;
            self.store.remove_by_client(client_id).await?;
        }

        // 3. Port acquisition, recycling the LRU assignment if exhausted.
        let used = self.store.used_ports().await;
        let port = match self.allocator.allocate(&used) {
            Some(port) => port,
            None => self.recycle_oldest().await?,
        };

        // 4. Create.
        let name = format!("vnc_{}", client_id);
        let env = vec![
            ("APPNAME".to_string(), self.vnc.appname.clone()),
            ("WIDTH".to_string(), width.clone().unwrap_or_else(|| self.vnc.width.clone())),
            ("HEIGHT".to_string(), height.clone().unwrap_or_else(|| self.vnc.height.clone())),
        ];

        let opts = CreateOptions {
            name: &name,
            host_port: port,
            image: &self.vnc.image,
            container_port: self.vnc.container_port,
            env,
            network: Some(self.vnc.network_name.as_str()),
            network_subnet: Some(self.vnc.network_subnet.as_str()),
        };

        let created = self
            .runtime
            .create(opts)
            .await
            .map_err(|e| OrchestratorError::CreationFailed(e.to_string()))?;

        self.runtime
            .wait_ready(&created.id, std::time::Duration::from_secs(60))
            .await;

        // 5. Persist.
        self.store
            .add_record(client_id, &created.id, &created.name, port, width, height)
            .await?;

        info!(client_id, port, "created new container");

        // 6. Return and trigger replenishment.
        self.pool.replenish();

        Ok(AccessResult {
            action: AccessAction::Created,
            client_id: client_id.to_string(),
            port,
            url: self.url_for(port),
        })
    }

    async fn recycle_oldest(&self) -> Result<u16> {
        let Some(victim) = self.store.find_oldest_accessed().await else {
            return Err(OrchestratorError::CapacityExhausted {
                message: "no free port and nothing to recycle".to_string(),
                max_slots: self.allocator.max_slots(),
            });
        };

        warn!(
            client_id = victim.client_id,
            port = victim.port,
            "port range exhausted, recycling oldest assignment"
        );
        self.runtime.remove(&victim.container_id).await;
        self.store.remove_by_client(&victim.client_id).await?;
        Ok(victim.port)
    }

    pub async fn status(&self, client_id: &str) -> Option<(u16, bool)> {
        let record = self.store.find_by_client(client_id).await?;
        let healthy = self.runtime.is_healthy(&record.container_id).await;
        Some((record.port, healthy))
    }

    pub async fn remove(&self, client_id: &str) -> Result<(String, u16)> {
        let record = self
            .store
            .find_by_client(client_id)
            .await
            .ok_or_else(|| OrchestratorError::NotFound(client_id.to_string()))?;

        self.runtime.remove(&record.container_id).await;
        self.store.remove_by_client(client_id).await?;
        info!(client_id, port = record.port, "removed container on request");
        Ok((record.container_id, record.port))
    }

    pub async fn remove_all(&self) -> Result<usize> {
        let records = self.store.load_records().await;
        for record in &records {
            self.runtime.remove(&record.container_id).await;
        }
        self.store.save_records(Vec::new()).await?;
        info!(count = records.len(), "removed all containers");
        Ok(records.len())
    }
}
