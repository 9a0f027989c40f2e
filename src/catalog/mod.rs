//! Storage Catalog Backends
//!
//! Durable homes for [`StorageRecord`](crate::domain::StorageRecord)s:
//! - Memory: in-process, for standalone mode and tests
//! - File: one JSON document per record under a directory

mod file;
mod memory;

pub use file::{FileCatalog, FileCatalogConfig};
pub use memory::MemoryCatalog;

use crate::domain::ports::CatalogStoreRef;
use crate::error::Result;
use std::path::PathBuf;
use std::sync::Arc;

/// Which catalog backend to open
#[derive(Debug, Clone)]
pub enum CatalogBackend {
    Memory,
    File(FileCatalogConfig),
}

impl CatalogBackend {
    /// File catalog rooted at `root`
    pub fn file(root: impl Into<PathBuf>) -> Self {
        CatalogBackend::File(FileCatalogConfig {
            root_path: root.into(),
            ..Default::default()
        })
    }
}

/// Factory for catalog adapters
pub struct CatalogFactory;

impl CatalogFactory {
    /// Open the configured catalog, loading any existing records
    pub async fn open(backend: CatalogBackend) -> Result<CatalogStoreRef> {
        match backend {
            CatalogBackend::Memory => Ok(Arc::new(MemoryCatalog::new())),
            CatalogBackend::File(config) => Ok(Arc::new(FileCatalog::open(config).await?)),
        }
    }
}
