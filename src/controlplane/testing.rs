//! Test doubles for the orchestrator ports
//!
//! Each fake records how often it was called and can be told to fail, so
//! reconciliation tests can break exactly one source of truth at a time.

use crate::catalog::MemoryCatalog;
use crate::domain::ports::{CatalogStore, ClusterStatusProvider, InstalledRelease, ReleaseManager};
use crate::domain::record::{
    ClaimPhase, Exposure, ServiceEndpoint, StorageRecord, StorageSpec, VolumeClaimStatus,
    WorkloadPhase, WorkloadStatus,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Two rendered objects, as a postgres chart would produce for `release`
pub fn two_resource_manifest(release: &str) -> String {
    format!(
        r#"---
# Source: postgresql/templates/svc.yaml
apiVersion: v1
kind: Service
metadata:
  name: {release}
spec:
  type: ClusterIP
  ports:
    - port: 5432
---
# Source: postgresql/templates/statefulset.yaml
apiVersion: apps/v1
kind: StatefulSet
metadata:
  name: {release}
spec:
  replicas: 1
  volumeClaimTemplates:
    - metadata:
        name: data
"#
    )
}

// =============================================================================
// Release Manager
// =============================================================================

#[derive(Default)]
pub struct FakeReleases {
    /// Release names handed out by the next installs, in order
    next_names: Mutex<VecDeque<String>>,
    pub releases: Mutex<BTreeMap<String, String>>,
    pub fail_install: AtomicBool,
    /// Installs fail with a name collision this many times
    pub name_collisions: AtomicUsize,
    /// Delay applied to installs, after the release is recorded
    pub install_delay: Mutex<Option<Duration>>,
    pub fail_manifest: AtomicBool,
    /// Manifest returned by the next install instead of the rendered one
    pub install_manifest_override: Mutex<Option<String>>,
    pub install_calls: AtomicUsize,
    names_issued: AtomicUsize,
    pub manifest_calls: AtomicUsize,
    pub uninstall_calls: AtomicUsize,
}

impl FakeReleases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_next_name(self, name: &str) -> Self {
        self.next_names.lock().push_back(name.to_string());
        self
    }

    pub fn set_manifest(&self, release: &str, manifest: &str) {
        self.releases
            .lock()
            .insert(release.to_string(), manifest.to_string());
    }

    pub fn contains(&self, release: &str) -> bool {
        self.releases.lock().contains_key(release)
    }
}

#[async_trait]
impl ReleaseManager for FakeReleases {
    fn release_name(&self, base: &str) -> String {
        let n = self.names_issued.fetch_add(1, Ordering::SeqCst);
        self.next_names
            .lock()
            .pop_front()
            .unwrap_or_else(|| format!("{}-{:04x}", base, n))
    }

    async fn install(
        &self,
        release_name: &str,
        _chart: &str,
        _spec: &StorageSpec,
    ) -> Result<InstalledRelease> {
        self.install_calls.fetch_add(1, Ordering::SeqCst);
        let collided = self
            .name_collisions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if collided {
            return Err(Error::ReleaseNameInUse(release_name.to_string()));
        }
        if self.fail_install.load(Ordering::SeqCst) {
            return Err(Error::Install("chart rejected the parameters".into()));
        }

        let rendered = two_resource_manifest(release_name);
        self.set_manifest(release_name, &rendered);

        let delay = *self.install_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let manifest = self
            .install_manifest_override
            .lock()
            .take()
            .unwrap_or(rendered);
        Ok(InstalledRelease {
            release_name: release_name.to_string(),
            manifest,
        })
    }

    async fn rendered_manifest(&self, release_name: &str) -> Result<String> {
        self.manifest_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_manifest.load(Ordering::SeqCst) {
            return Err(Error::ReleaseManager {
                operation: "get manifest".into(),
                reason: "cluster unreachable".into(),
            });
        }
        self.releases
            .lock()
            .get(release_name)
            .cloned()
            .ok_or_else(|| Error::not_found("Release", release_name))
    }

    async fn uninstall(&self, release_name: &str) -> Result<()> {
        self.uninstall_calls.fetch_add(1, Ordering::SeqCst);
        self.releases
            .lock()
            .remove(release_name)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("Release", release_name))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

// =============================================================================
// Cluster Status
// =============================================================================

#[derive(Default)]
pub struct FakeCluster {
    pub ready_replicas: AtomicUsize,
    pub fail_workload: AtomicBool,
    pub fail_endpoints: AtomicBool,
    pub fail_claims: AtomicBool,
    /// Delay applied to the workload probe
    pub workload_delay: Mutex<Option<Duration>>,
    pub workload_calls: AtomicUsize,
    pub endpoint_calls: AtomicUsize,
    pub claim_calls: AtomicUsize,
}

impl FakeCluster {
    pub fn new() -> Self {
        let cluster = Self::default();
        cluster.ready_replicas.store(1, Ordering::SeqCst);
        cluster
    }

    fn probe_failure(probe: &str) -> Error {
        Error::StatusProbe {
            probe: probe.into(),
            reason: "apiserver unavailable".into(),
        }
    }
}

#[async_trait]
impl ClusterStatusProvider for FakeCluster {
    async fn workload_status(&self, record: &StorageRecord) -> Result<WorkloadStatus> {
        self.workload_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.workload_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_workload.load(Ordering::SeqCst) {
            return Err(Self::probe_failure("workload"));
        }
        let ready = self.ready_replicas.load(Ordering::SeqCst) as i32;
        Ok(WorkloadStatus {
            workloads: vec![format!("StatefulSet/{}", record.release_name)],
            desired_replicas: 1,
            ready_replicas: ready,
            available_replicas: ready,
            phase: WorkloadPhase::from_counts(1, 1, ready),
        })
    }

    async fn service_endpoints(&self, record: &StorageRecord) -> Result<Vec<ServiceEndpoint>> {
        self.endpoint_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_endpoints.load(Ordering::SeqCst) {
            return Err(Self::probe_failure("service_endpoint"));
        }
        Ok(vec![ServiceEndpoint {
            service: record.release_name.clone(),
            host: "203.0.113.7".into(),
            port: 5432,
            protocol: "TCP".into(),
            exposure: Exposure::LoadBalancer,
        }])
    }

    async fn volume_claim_status(&self, record: &StorageRecord) -> Result<Vec<VolumeClaimStatus>> {
        self.claim_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_claims.load(Ordering::SeqCst) {
            return Err(Self::probe_failure("volume_claim"));
        }
        Ok(vec![VolumeClaimStatus {
            name: format!("data-{}-0", record.release_name),
            phase: ClaimPhase::Bound,
            capacity: Some("10Gi".into()),
            storage_class: None,
        }])
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// Memory catalog whose writes can be made to fail
#[derive(Default)]
pub struct FlakyCatalog {
    pub inner: MemoryCatalog,
    pub fail_insert: AtomicBool,
    pub fail_update: AtomicBool,
    pub insert_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
}

impl FlakyCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for FlakyCatalog {
    async fn insert(&self, record: &StorageRecord) -> Result<()> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(Error::Persistence("disk full".into()));
        }
        self.inner.insert(record).await
    }

    async fn update(&self, record: &StorageRecord) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(Error::Persistence("disk full".into()));
        }
        self.inner.update(record).await
    }

    async fn get(&self, release_name: &str) -> Result<StorageRecord> {
        self.inner.get(release_name).await
    }

    async fn list(&self) -> Result<Vec<StorageRecord>> {
        self.inner.list().await
    }

    async fn delete(&self, release_name: &str) -> Result<()> {
        self.inner.delete(release_name).await
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
