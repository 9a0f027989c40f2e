//! Domain Ports - Core trait definitions for the storage operator
//!
//! These traits define the boundaries between the reconciling orchestrator
//! and the three external systems it merges: the release manager, the
//! cluster status API and the catalog. Adapters implement these traits to
//! provide concrete functionality.

use crate::domain::record::{
    ServiceEndpoint, StorageRecord, StorageSpec, VolumeClaimStatus, WorkloadStatus,
};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Release Manager Port
// =============================================================================

/// Outcome of a successful install
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledRelease {
    /// Unique name of the new release
    pub release_name: String,
    /// Raw rendered manifest (multi-document YAML or JSON)
    pub manifest: String,
}

/// Port for chart release operations
#[async_trait]
pub trait ReleaseManager: Send + Sync {
    /// Fresh release name for a storage base name (`pg1` -> `pg1-7f3a`)
    fn release_name(&self, base: &str) -> String;

    /// Install release `release_name` of `chart` parameterized by `spec`
    ///
    /// Fails with `Error::ReleaseNameInUse` when the name is taken and with
    /// `Error::Install` when the parameters are invalid or the platform
    /// rejects the release. A failed install may leave a partial release
    /// behind under `release_name`.
    async fn install(
        &self,
        release_name: &str,
        chart: &str,
        spec: &StorageSpec,
    ) -> Result<InstalledRelease>;

    /// Current rendered manifest of a live release
    ///
    /// Fails with `Error::NotFound` when the release no longer exists.
    async fn rendered_manifest(&self, release_name: &str) -> Result<String>;

    /// Remove a release; `Error::NotFound` when already absent
    async fn uninstall(&self, release_name: &str) -> Result<()>;

    /// Check if the release manager is usable
    async fn health_check(&self) -> Result<bool>;
}

// =============================================================================
// Cluster Status Port
// =============================================================================

/// Port for live cluster status probes
///
/// Each probe reads the release's rendered resources from the record and
/// returns a fresh value for exactly one status field. Probes never modify
/// the record; merging is the orchestrator's job.
#[async_trait]
pub trait ClusterStatusProvider: Send + Sync {
    /// Aggregated readiness of the release's Deployments and StatefulSets
    async fn workload_status(&self, record: &StorageRecord) -> Result<WorkloadStatus>;

    /// Reachable endpoints of the release's Services
    async fn service_endpoints(&self, record: &StorageRecord) -> Result<Vec<ServiceEndpoint>>;

    /// Binding state of the release's persistent volume claims
    async fn volume_claim_status(&self, record: &StorageRecord) -> Result<Vec<VolumeClaimStatus>>;

    /// Check cluster connectivity
    async fn health_check(&self) -> Result<bool>;
}

// =============================================================================
// Catalog Port
// =============================================================================

/// Port for durable storage record persistence, keyed by release name
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Add a new record; fails with `Error::Persistence` if the release name
    /// is already cataloged
    async fn insert(&self, record: &StorageRecord) -> Result<()>;

    /// Replace the record with the same release name; `Error::NotFound` if
    /// absent
    async fn update(&self, record: &StorageRecord) -> Result<()>;

    /// Fetch one record; `Error::NotFound` if absent
    async fn get(&self, release_name: &str) -> Result<StorageRecord>;

    /// All records in insertion order
    async fn list(&self) -> Result<Vec<StorageRecord>>;

    /// Remove a record; `Error::NotFound` if absent
    async fn delete(&self, release_name: &str) -> Result<()>;

    /// Check if the catalog is readable and writable
    async fn health_check(&self) -> Result<bool>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ReleaseManagerRef = Arc<dyn ReleaseManager>;
pub type ClusterStatusProviderRef = Arc<dyn ClusterStatusProvider>;
pub type CatalogStoreRef = Arc<dyn CatalogStore>;
