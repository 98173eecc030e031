use crate::access::AccessService;
use crate::config::Config;
use crate::reaper::IdleReaper;
use crate::reconciler;
use crate::runtime::ContainerRuntime;
use crate::store::StateStore;
use crate::warm_pool::WarmPoolManager;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Composition root: owns the Store, the Runtime Adapter, the Pool Manager
/// handle, and the Reaper handle as explicit fields constructed once at
/// startup. The HTTP layer talks only to `access` and `store`.
pub struct Orchestrator {
    pub access: AccessService,
    pub store: Arc<StateStore>,
    pub max_slots: usize,
    pool: Arc<WarmPoolManager>,
    reaper: IdleReaper,
}

impl Orchestrator {
    /// Reconcile the store against the live runtime, start the idle
    /// reaper, and trigger an initial pool replenish. Returns only after
    /// reconciliation completes, so the HTTP listener never opens against
    /// a store that disagrees with the runtime.
    pub async fn start(config: Config, runtime: Arc<dyn ContainerRuntime>) -> Self {
        let store = Arc::new(StateStore::open(&config.state.state_file).await);

        info!("reconciling state store against the container runtime");
        reconciler::reconcile(&store, runtime.as_ref()).await;

        let pool = Arc::new(WarmPoolManager::new(store.clone(), runtime.clone(), &config));

        let reaper = IdleReaper::spawn(
            store.clone(),
            runtime.clone(),
            Duration::from_secs(config.reaper.cleanup_interval_minutes * 60),
            config.reaper.idle_timeout_hours,
        );

        let max_slots = config.max_slots();
        let access = AccessService::new(store.clone(), runtime, pool.clone(), &config);

        pool.replenish();

        Self {
            access,
            store,
            max_slots,
            pool,
            reaper,
        }
    }

    /// Cancel the reaper tick loop and wait briefly for any in-flight pool
    /// replenishment. Called once from the shutdown path; the reconciler
    /// remains the backstop for anything still abandoned on next boot.
    pub async fn shutdown(&self) {
        info!("stopping idle reaper");
        self.reaper.stop();
        info!("waiting briefly for in-flight pool replenishment");
        self.pool.wait_idle(Duration::from_secs(5)).await;
    }
}
