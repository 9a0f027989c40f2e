//! In-Memory Catalog
//!
//! Insertion-ordered record map behind a `parking_lot` lock. Nothing
//! survives a restart; used for standalone mode and tests.

use crate::domain::ports::CatalogStore;
use crate::domain::record::StorageRecord;
use crate::error::{Error, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;

/// In-memory catalog keyed by release name
#[derive(Default)]
pub struct MemoryCatalog {
    records: RwLock<IndexMap<String, StorageRecord>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cataloged records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn insert(&self, record: &StorageRecord) -> Result<()> {
        let mut records = self.records.write();
        if records.contains_key(&record.release_name) {
            return Err(Error::Persistence(format!(
                "release {} is already cataloged",
                record.release_name
            )));
        }
        records.insert(record.release_name.clone(), record.clone());
        Ok(())
    }

    async fn update(&self, record: &StorageRecord) -> Result<()> {
        let mut records = self.records.write();
        match records.get_mut(&record.release_name) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(Error::not_found("Storage", &record.release_name)),
        }
    }

    async fn get(&self, release_name: &str) -> Result<StorageRecord> {
        self.records
            .read()
            .get(release_name)
            .cloned()
            .ok_or_else(|| Error::not_found("Storage", release_name))
    }

    async fn list(&self) -> Result<Vec<StorageRecord>> {
        Ok(self.records.read().values().cloned().collect())
    }

    async fn delete(&self, release_name: &str) -> Result<()> {
        self.records
            .write()
            .shift_remove(release_name)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("Storage", release_name))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
