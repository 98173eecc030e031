use crate::runtime::{ContainerRuntime, CreateOptions};
use crate::store::{StateStore, POOL_CLIENT_ID};
use crate::allocator::PortAllocator;
use crate::config::{Config, VncConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Keeps exactly `WARM_POOL_SIZE` unassigned containers on hand so an
/// incoming client can be handed a container without waiting on
/// `docker create`.
pub struct WarmPoolManager {
    store: Arc<StateStore>,
    runtime: Arc<dyn ContainerRuntime>,
    allocator: PortAllocator,
    vnc: VncConfig,
    target: usize,
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

impl WarmPoolManager {
    pub fn new(
        store: Arc<StateStore>,
        runtime: Arc<dyn ContainerRuntime>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            runtime,
            allocator: PortAllocator::new(config.vnc.port_range_min, config.vnc.port_range_max),
            vnc: config.vnc.clone(),
            target: config.pool.warm_pool_size,
            in_flight: Mutex::new(None),
        }
    }

    /// Enqueues a replenish pass on the background runtime and returns
    /// immediately. Safe to call from a request handler.
    pub fn replenish(self: &Arc<Self>) {
        if self.target == 0 {
            return;
        }
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            this.fill().await;
        });
        *self.in_flight.lock().unwrap() = Some(handle);
    }

    /// Best-effort wait for the most recently triggered replenish pass to
    /// finish, bounded by `timeout`. Used on graceful shutdown so a pool
    /// create isn't abandoned mid-flight unless it genuinely runs long; the
    /// reconciler remains the backstop if it does.
    pub async fn wait_idle(&self, timeout: Duration) {
        let handle = self.in_flight.lock().unwrap().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(timeout, handle).await.is_err() {
                warn!("pool replenishment still in flight at shutdown, abandoning");
            }
        }
    }

    async fn fill(&self) {
        let current = self.store.find_unassigned().await;
        let needed = self.target.saturating_sub(current.len());
        if needed == 0 {
            debug!(target = self.target, "warm pool already at target");
            return;
        }

        info!(needed, target = self.target, "replenishing warm pool");

        for _ in 0..needed {
            let used = self.store.used_ports().await;
            let Some(port) = self.allocator.allocate(&used) else {
                warn!("no free port available, stopping warm pool replenish early");
                break;
            };

            let suffix = self.store.next_pool_suffix();
            let name = format!("vnc_pool_{}", suffix);

            let env = vec![
                ("APPNAME".to_string(), self.vnc.appname.clone()),
                ("WIDTH".to_string(), self.vnc.width.clone()),
                ("HEIGHT".to_string(), self.vnc.height.clone()),
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

            let created = match self.runtime.create(opts).await {
                Ok(created) => created,
                Err(e) => {
                    warn!(error = %e, name, "pool container creation failed, continuing");
                    continue;
                }
            };

            self.runtime
                .wait_ready(&created.id, std::time::Duration::from_secs(60))
                .await;

            if let Err(e) = self
                .store
                .add_record(POOL_CLIENT_ID, &created.id, &created.name, port, None, None)
                .await
            {
                warn!(error = %e, name, "failed to persist pool record");
            }
        }
    }
}
