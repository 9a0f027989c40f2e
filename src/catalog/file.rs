//! File Catalog
//!
//! One pretty-printed JSON document per record, named after the release.
//! Documents are written to a temporary file and renamed into place so a
//! crash never leaves a half-written record. An in-memory index, loaded at
//! open time, serves reads and keeps insertion order.

use crate::domain::ports::CatalogStore;
use crate::domain::record::StorageRecord;
use crate::error::{Error, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const DOCUMENT_EXTENSION: &str = "json";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the file catalog
#[derive(Debug, Clone)]
pub struct FileCatalogConfig {
    /// Directory holding the record documents
    pub root_path: PathBuf,
    /// fsync each document before renaming it into place
    pub sync_writes: bool,
}

impl Default for FileCatalogConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("/var/lib/storage-release-operator/catalog"),
            sync_writes: true,
        }
    }
}

// =============================================================================
// File Catalog
// =============================================================================

/// Directory-backed catalog
///
/// Writes run on their own task so a caller that stops waiting (a timeout,
/// a dropped request) never leaves the directory and the index disagreeing.
pub struct FileCatalog {
    shared: Arc<Shared>,
}

struct Shared {
    root_path: PathBuf,
    sync_writes: bool,
    /// Release name -> record, in insertion order
    index: RwLock<IndexMap<String, StorageRecord>>,
    /// Serializes writers so the index and the directory agree
    write_lock: Mutex<()>,
}

impl FileCatalog {
    /// Open (creating if needed) a catalog directory and load its records
    pub async fn open(config: FileCatalogConfig) -> Result<Self> {
        fs::create_dir_all(&config.root_path).await?;

        let mut records = Vec::new();
        let mut entries = fs::read_dir(&config.root_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXTENSION) {
                continue;
            }
            let bytes = fs::read(&path).await?;
            match serde_json::from_slice::<StorageRecord>(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable catalog document {:?}: {}", path, e),
            }
        }

        // Directory order is arbitrary; creation time recovers insertion order
        records.sort_by_key(|r| r.created_at);

        info!(
            "Opened file catalog at {:?} ({} records)",
            config.root_path,
            records.len()
        );

        Ok(Self {
            shared: Arc::new(Shared {
                root_path: config.root_path,
                sync_writes: config.sync_writes,
                index: RwLock::new(
                    records
                        .into_iter()
                        .map(|r| (r.release_name.clone(), r))
                        .collect(),
                ),
                write_lock: Mutex::new(()),
            }),
        })
    }

    /// Open with default settings under `root_path`
    pub async fn with_path(root_path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(FileCatalogConfig {
            root_path: root_path.into(),
            ..Default::default()
        })
        .await
    }

    /// Directory the documents live in
    pub fn root_path(&self) -> &Path {
        &self.shared.root_path
    }

    /// Run a write to completion even if the caller goes away
    async fn detached<F, Fut>(&self, write: F) -> Result<()>
    where
        F: FnOnce(Arc<Shared>) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        tokio::spawn(write(self.shared.clone()))
            .await
            .map_err(|e| Error::Persistence(format!("catalog write aborted: {}", e)))?
    }
}

impl Shared {
    fn document_path(&self, release_name: &str) -> PathBuf {
        self.root_path
            .join(format!("{}.{}", release_name, DOCUMENT_EXTENSION))
    }

    async fn write_document(&self, record: &StorageRecord) -> Result<()> {
        let path = self.document_path(&record.release_name);
        let tmp_path = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(record)?;

        let mut file = fs::File::create(&tmp_path).await.map_err(persistence)?;
        file.write_all(&body).await.map_err(persistence)?;
        file.flush().await.map_err(persistence)?;
        if self.sync_writes {
            file.sync_all().await.map_err(persistence)?;
        }
        drop(file);

        fs::rename(&tmp_path, &path).await.map_err(persistence)?;
        debug!("Wrote catalog document {:?}", path);
        Ok(())
    }

    async fn insert(&self, record: StorageRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.index.read().contains_key(&record.release_name) {
            return Err(Error::Persistence(format!(
                "release {} is already cataloged",
                record.release_name
            )));
        }

        self.write_document(&record).await?;
        self.index
            .write()
            .insert(record.release_name.clone(), record);
        Ok(())
    }

    async fn update(&self, record: StorageRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if !self.index.read().contains_key(&record.release_name) {
            return Err(Error::not_found("Storage", &record.release_name));
        }

        self.write_document(&record).await?;
        if let Some(existing) = self.index.write().get_mut(&record.release_name) {
            *existing = record;
        }
        Ok(())
    }

    async fn delete(&self, release_name: String) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if !self.index.read().contains_key(&release_name) {
            return Err(Error::not_found("Storage", &release_name));
        }

        match fs::remove_file(self.document_path(&release_name)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(persistence(e)),
        }
        self.index.write().shift_remove(&release_name);
        Ok(())
    }
}

fn persistence(e: std::io::Error) -> Error {
    Error::Persistence(e.to_string())
}

#[async_trait]
impl CatalogStore for FileCatalog {
    async fn insert(&self, record: &StorageRecord) -> Result<()> {
        let record = record.clone();
        self.detached(|shared| async move { shared.insert(record).await })
            .await
    }

    async fn update(&self, record: &StorageRecord) -> Result<()> {
        let record = record.clone();
        self.detached(|shared| async move { shared.update(record).await })
            .await
    }

    async fn get(&self, release_name: &str) -> Result<StorageRecord> {
        self.shared
            .index
            .read()
            .get(release_name)
            .cloned()
            .ok_or_else(|| Error::not_found("Storage", release_name))
    }

    async fn list(&self) -> Result<Vec<StorageRecord>> {
        Ok(self.shared.index.read().values().cloned().collect())
    }

    async fn delete(&self, release_name: &str) -> Result<()> {
        let release_name = release_name.to_string();
        self.detached(|shared| async move { shared.delete(release_name).await })
            .await
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(fs::metadata(&self.shared.root_path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false))
    }
}
