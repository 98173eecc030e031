mod record;

pub use record::ContainerRecord;

use crate::error::{OrchestratorError, Result};
use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Sentinel `client_id` denoting an unassigned warm-pool container.
pub const POOL_CLIENT_ID: &str = "__pool__";

/// Durable client -> container mapping.
///
/// Holds the authoritative record set in memory behind a single exclusive
/// lock spanning every read-modify-write sequence; the lock is never held
/// across a runtime adapter call. Every mutation is flushed to disk before
/// the lock is released, so the in-memory vector and the on-disk file are
/// never observably out of sync to a caller of this type.
pub struct StateStore {
    path: PathBuf,
    records: Mutex<Vec<ContainerRecord>>,
    pool_counter: AtomicU64,
}

impl StateStore {
    /// Load the store from `path`, self-healing on a missing or corrupt file.
    pub async fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let records = read_file(&path).await;
        Self {
            path,
            records: Mutex::new(records),
            pool_counter: AtomicU64::new(0),
        }
    }

    /// Consistent snapshot of every record.
    pub async fn load_records(&self) -> Vec<ContainerRecord> {
        self.records.lock().await.clone()
    }

    /// Replace the entire record set atomically.
    pub async fn save_records(&self, records: Vec<ContainerRecord>) -> Result<()> {
        let mut guard = self.records.lock().await;
        write_file(&self.path, &records).await?;
        *guard = records;
        Ok(())
    }

    /// The non-pool record whose `client_id` matches, if any.
    pub async fn find_by_client(&self, client_id: &str) -> Option<ContainerRecord> {
        let guard = self.records.lock().await;
        guard
            .iter()
            .find(|r| r.client_id != POOL_CLIENT_ID && r.client_id == client_id)
            .cloned()
    }

    /// Remove any existing record for `client_id`, append a new one, persist.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_record(
        &self,
        client_id: &str,
        container_id: &str,
        container_name: &str,
        port: u16,
        width: Option<String>,
        height: Option<String>,
    ) -> Result<ContainerRecord> {
        let mut guard = self.records.lock().await;

        if client_id != POOL_CLIENT_ID {
            guard.retain(|r| r.client_id != client_id);
        }

        let now = Utc::now();
        let record = ContainerRecord {
            client_id: client_id.to_string(),
            container_id: container_id.to_string(),
            container_name: container_name.to_string(),
            port,
            created_at: now,
            last_accessed_at: now,
            width,
            height,
        };
        guard.push(record.clone());

        write_file(&self.path, &guard).await?;
        Ok(record)
    }

    /// Advance `last_accessed_at` to now for the matching record.
    pub async fn touch_client(&self, client_id: &str) -> Result<()> {
        let mut guard = self.records.lock().await;
        if let Some(rec) = guard
            .iter_mut()
            .find(|r| r.client_id != POOL_CLIENT_ID && r.client_id == client_id)
        {
            rec.last_accessed_at = Utc::now();
        }
        write_file(&self.path, &guard).await?;
        Ok(())
    }

    /// The non-pool record minimizing `last_accessed_at`. A record loaded
    /// with a missing access timestamp already has it filled in by
    /// [`ContainerRecord`]'s deserializer (falling back to `created_at`, then
    /// the epoch), so this is a plain min-by over the in-memory field. Ties
    /// are broken by first occurrence in file order.
    pub async fn find_oldest_accessed(&self) -> Option<ContainerRecord> {
        let guard = self.records.lock().await;
        guard
            .iter()
            .filter(|r| r.client_id != POOL_CLIENT_ID)
            .min_by_key(|r| r.last_accessed_at)
            .cloned()
    }

    /// Delete every record with the given `client_id`. By the client
    /// uniqueness invariant this affects at most one record for non-sentinel
    /// ids; callers of the sentinel remove every pool record, which is never
    /// done in practice.
    pub async fn remove_by_client(&self, client_id: &str) -> Result<()> {
        let mut guard = self.records.lock().await;
        guard.retain(|r| r.client_id != client_id);
        write_file(&self.path, &guard).await?;
        Ok(())
    }

    /// Delete the one record with the given `container_id`. Unlike
    /// `remove_by_client`, this is safe to use on a sentinel `__pool__`
    /// record: `container_id` is unique per record, so sibling pool records
    /// sharing the same `client_id` are left untouched.
    pub async fn remove_by_container_id(&self, container_id: &str) -> Result<()> {
        let mut guard = self.records.lock().await;
        guard.retain(|r| r.container_id != container_id);
        write_file(&self.path, &guard).await?;
        Ok(())
    }

    /// Every port currently assigned, pool records included.
    pub async fn used_ports(&self) -> HashSet<u16> {
        let guard = self.records.lock().await;
        guard.iter().map(|r| r.port).collect()
    }

    /// Every unassigned (`__pool__`) record.
    pub async fn find_unassigned(&self) -> Vec<ContainerRecord> {
        let guard = self.records.lock().await;
        guard
            .iter()
            .filter(|r| r.client_id == POOL_CLIENT_ID)
            .cloned()
            .collect()
    }

    /// Rewrite the first pool record's `client_id` to `client_id`, updating
    /// its access timestamp and display dimensions. Returns `None` if no
    /// pool record exists.
    pub async fn claim_pool_container(
        &self,
        client_id: &str,
        width: Option<String>,
        height: Option<String>,
    ) -> Result<Option<ContainerRecord>> {
        let mut guard = self.records.lock().await;
        guard.retain(|r| r.client_id != client_id);

        let claimed = if let Some(rec) = guard.iter_mut().find(|r| r.client_id == POOL_CLIENT_ID) {
            rec.client_id = client_id.to_string();
            rec.last_accessed_at = Utc::now();
            rec.width = width;
            rec.height = height;
            Some(rec.clone())
        } else {
            None
        };

        write_file(&self.path, &guard).await?;
        Ok(claimed)
    }

    /// Next counter value for naming a pool container (`vnc_pool_<n>`).
    pub fn next_pool_suffix(&self) -> u64 {
        self.pool_counter.fetch_add(1, Ordering::Relaxed)
    }
}

async fn read_file(path: &Path) -> Vec<ContainerRecord> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = ?path, error = %e, "failed to read state file, starting empty");
            } else {
                debug!(path = ?path, "state file does not exist yet, starting empty");
            }
            return Vec::new();
        }
    };

    if content.trim().is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Vec<ContainerRecord>>(&content) {
        Ok(records) => records,
        Err(e) => {
            warn!(path = ?path, error = %e, "state file is not a valid JSON array, treating as empty");
            Vec::new()
        }
    }
}

async fn write_file(path: &Path, records: &[ContainerRecord]) -> Result<()> {
    let serialized = serde_json::to_string_pretty(records).map_err(|e| {
        OrchestratorError::StateCorrupt(format!("failed to serialize state: {}", e))
    })?;

    let temp_path = temp_path_for(path);

    fs::write(&temp_path, &serialized).await.map_err(|e| {
        error!(path = ?temp_path, error = %e, "failed to write temporary state file");
        OrchestratorError::Io(e)
    })?;

    fs::rename(&temp_path, path).await.map_err(|e| {
        error!(path = ?path, error = %e, "failed to rename temporary state file into place");
        OrchestratorError::Io(e)
    })?;

    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("state.json");

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    let mut temp = path.to_path_buf();
    temp.set_file_name(format!("{}.{}.tmp", filename, nanos));
    temp
}
