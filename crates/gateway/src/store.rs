//! Durable string-keyed record namespaces backed by one JSON file each.
//!
//! Every mutation is a full load -> modify -> save cycle. Cycles on one namespace are
//! serialized by its write lock, the lock is held until the cycle has finished on the
//! blocking pool (even if the caller went away), and saves go through a temp file and
//! an atomic rename so readers and crashes only ever see the old or the new state.

use std::collections::BTreeMap;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, warn};

use crate::error::{GatewayError, Result};

pub type Records<R> = BTreeMap<String, R>;

pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Record for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// What an `update` closure wants done with the key it was handed
#[derive(Debug)]
pub enum Change<R> {
    Keep,
    Put(R),
    Delete,
}

#[derive(Clone, Copy, Debug)]
pub struct StoreTimeouts {
    /// Wait for the namespace write lock before giving up with `Busy`
    pub lock: Duration,
    /// Bound on one blocking load or load-modify-save cycle
    pub io: Duration,
}

#[derive(Serialize, Deserialize)]
struct NamespaceFile<T> {
    records: T,
    checksum: String,
}

pub struct RecordStore<R> {
    namespace: String,
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
    timeouts: StoreTimeouts,
    saves: Arc<AtomicU64>,
    _records: PhantomData<fn() -> R>,
}

impl<R: Record> RecordStore<R> {
    pub fn open(data_dir: &Path, namespace: &str, timeouts: StoreTimeouts) -> Self {
        Self {
            namespace: namespace.to_string(),
            path: data_dir.join(format!("{}.json", namespace)),
            write_lock: Arc::new(Mutex::new(())),
            timeouts,
            saves: Arc::new(AtomicU64::new(0)),
            _records: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of saves this handle has performed
    pub fn saves(&self) -> u64 {
        self.saves.load(Ordering::Relaxed)
    }

    /// Snapshot of the whole namespace. Missing or corrupt files read as empty.
    pub async fn load(&self) -> Result<Records<R>> {
        let (namespace, path) = (self.namespace.clone(), self.path.clone());
        self.blocking(move || Ok(read_records(&namespace, &path)))
            .await
    }

    pub async fn get(&self, key: &str) -> Result<Option<R>> {
        let mut records = self.load().await?;
        Ok(records.remove(key))
    }

    /// Runs `f` against the freshest persisted value of `key` under the write lock and
    /// applies the returned change. `Change::Keep` never writes.
    pub async fn update<T, F>(&self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce(Option<&R>) -> (Change<R>, T) + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.lock().await?;
        let (namespace, path, key) = (self.namespace.clone(), self.path.clone(), key.to_string());
        let saves = self.saves.clone();

        self.blocking(move || {
            let _guard = guard;
            let mut records = read_records::<R>(&namespace, &path);
            let (change, out) = f(records.get(&key));

            let changed = match change {
                Change::Keep => false,
                Change::Put(record) => {
                    records.insert(key, record);
                    true
                }
                Change::Delete => records.remove(&key).is_some(),
            };

            if changed {
                write_records(&namespace, &path, &records)?;
                saves.fetch_add(1, Ordering::Relaxed);
            }
            Ok(out)
        })
        .await
    }

    /// Drops every record `keep` rejects; saves once, and only if something was dropped.
    pub async fn retain<F>(&self, mut keep: F) -> Result<usize>
    where
        F: FnMut(&str, &R) -> bool + Send + 'static,
    {
        let guard = self.lock().await?;
        let (namespace, path) = (self.namespace.clone(), self.path.clone());
        let saves = self.saves.clone();

        self.blocking(move || {
            let _guard = guard;
            let mut records = read_records::<R>(&namespace, &path);
            let before = records.len();
            records.retain(|key, record| keep(key, record));
            let removed = before - records.len();

            if removed > 0 {
                write_records(&namespace, &path, &records)?;
                saves.fetch_add(1, Ordering::Relaxed);
            }
            Ok(removed)
        })
        .await
    }

    async fn lock(&self) -> Result<OwnedMutexGuard<()>> {
        tokio::time::timeout(self.timeouts.lock, self.write_lock.clone().lock_owned())
            .await
            .map_err(|_| {
                warn!(
                    "Timed out after {:?} waiting for the {} store lock",
                    self.timeouts.lock, self.namespace
                );
                GatewayError::Busy
            })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        match tokio::time::timeout(self.timeouts.io, tokio::task::spawn_blocking(f)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(GatewayError::Internal(format!(
                "{} store task failed: {}",
                self.namespace, e
            ))),
            Err(_) => Err(GatewayError::Storage(format!(
                "{} store I/O timed out after {:?}",
                self.namespace, self.timeouts.io
            ))),
        }
    }
}

fn compute_checksum<R: Serialize>(namespace: &str, records: &Records<R>) -> Result<String> {
    let canonical = serde_json::to_vec(records)
        .map_err(|e| GatewayError::Storage(format!("Serialize failed: {}", e)))?;

    let mut hasher = Sha256::new();
    hasher.update(b"linkgate_store_v1:");
    hasher.update(namespace.as_bytes());
    hasher.update(b":");
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}

fn read_records<R: Record>(namespace: &str, path: &Path) -> Records<R> {
    if !path.exists() {
        debug!("No {} store at {}, starting empty", namespace, path.display());
        return Records::new();
    }

    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            warn!("Failed to read {} store: {}, treating as empty", namespace, e);
            return Records::new();
        }
    };

    let file: NamespaceFile<Records<R>> = match serde_json::from_slice(&data) {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to parse {} store: {}, treating as empty", namespace, e);
            return Records::new();
        }
    };

    match compute_checksum(namespace, &file.records) {
        Ok(checksum) if checksum == file.checksum => file.records,
        Ok(_) => {
            error!("Checksum mismatch for {} store - data corrupted, treating as empty", namespace);
            Records::new()
        }
        Err(e) => {
            error!("Failed to verify {} store: {}", namespace, e);
            Records::new()
        }
    }
}

fn write_records<R: Record>(namespace: &str, path: &Path, records: &Records<R>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            GatewayError::Storage(format!("Failed to create {}: {}", parent.display(), e))
        })?;
    }

    let file = NamespaceFile {
        checksum: compute_checksum(namespace, records)?,
        records,
    };
    let json = serde_json::to_vec_pretty(&file)
        .map_err(|e| GatewayError::Storage(format!("Serialize failed: {}", e)))?;

    let temp_path = path.with_extension("tmp");
    {
        let mut temp = std::fs::File::create(&temp_path)
            .map_err(|e| GatewayError::Storage(format!("Failed to create temp store: {}", e)))?;
        temp.write_all(&json)
            .map_err(|e| GatewayError::Storage(format!("Write failed: {}", e)))?;
        temp.sync_all()
            .map_err(|e| GatewayError::Storage(format!("Sync failed: {}", e)))?;
    }

    std::fs::rename(&temp_path, path)
        .map_err(|e| GatewayError::Storage(format!("Rename failed: {}", e)))?;

    Ok(())
}
