//! Storage Release Operator
//!
//! Provisions storage instances (databases, object stores, volumes) as chart
//! releases on a Kubernetes cluster and keeps a catalog record for each one,
//! reconciled against the live cluster on every read.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                         REST API (axum)                               │
//! │        /v1/storage  /v1/storage/:releaseName  /v1/status              │
//! ├───────────────────────────────────────────────────────────────────────┤
//! │                     Reconciling Orchestrator                          │
//! │   create: validate → install → decode → probe → insert (or roll back) │
//! │   get/list: decode → workload → endpoints → claims → persist          │
//! ├───────────────────────┬───────────────────────┬───────────────────────┤
//! │    Release Manager    │ Cluster Status Provider│     Catalog Store    │
//! │  Helm CLI │ in-memory │ kube-rs │ standalone   │   file │ memory      │
//! └───────────────────────┴───────────────────────┴───────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`controlplane`]: Orchestrator, refresh steps, adapters and the REST API
//! - [`catalog`]: Catalog store backends
//! - [`domain`]: Storage records and the port traits
//! - [`metrics`]: Prometheus collectors
//! - [`error`]: Error types and handling

pub mod catalog;
pub mod controlplane;
pub mod domain;
pub mod error;
pub mod metrics;

// Re-export commonly used types
pub use controlplane::{
    ApiServer, ApiServerConfig, Orchestrator, OrchestratorConfig, OrchestratorStatus,
};

pub use controlplane::cluster::{KubeStatusConfig, KubeStatusProvider, StaticStatusProvider};
pub use controlplane::release::{
    HelmConfig, HelmReleaseManager, InMemoryReleaseManager, ReleaseBackend,
    ReleaseManagerFactory,
};

pub use catalog::{CatalogBackend, CatalogFactory, FileCatalog, FileCatalogConfig, MemoryCatalog};

pub use domain::ports::{
    CatalogStore, CatalogStoreRef, ClusterStatusProvider, ClusterStatusProviderRef,
    InstalledRelease, ReleaseManager, ReleaseManagerRef,
};
pub use domain::record::{StorageRecord, StorageSpec, StorageStatus};

pub use error::{Error, Result};
pub use metrics::Metrics;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
