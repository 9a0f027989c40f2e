//! Reconciling Orchestrator
//!
//! Merges three independently failing sources of truth into one storage
//! record:
//! - the release manager (what was installed and what it rendered)
//! - the cluster (what is actually running)
//! - the catalog (what we remember)
//!
//! Writes to the catalog happen only here.

use crate::controlplane::refresh::{bounded, RefreshReport, Refresher};
use crate::domain::ports::{
    CatalogStoreRef, ClusterStatusProviderRef, InstalledRelease, ReleaseManagerRef,
};
use crate::domain::record::{ResourcesState, StorageRecord, StorageSpec};
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Install attempts when a generated release name is already taken
const MAX_NAME_ATTEMPTS: usize = 3;

// =============================================================================
// Orchestrator Configuration
// =============================================================================

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Chart installed when the spec names none
    pub default_chart: String,
    /// Upper bound on any single external call
    pub call_timeout: Duration,
    /// Upper bound on one release install; longer than the release
    /// manager's own deadline so it can fail on its own first
    pub install_timeout: Duration,
    /// Records refreshed concurrently by `list_storage`
    pub list_concurrency: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_chart: "bitnami/postgresql".to_string(),
            call_timeout: Duration::from_secs(30),
            install_timeout: Duration::from_secs(60),
            list_concurrency: 8,
        }
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Coordinates create, list, get and delete of storage releases
pub struct Orchestrator {
    config: OrchestratorConfig,
    releases: ReleaseManagerRef,
    cluster: ClusterStatusProviderRef,
    catalog: CatalogStoreRef,
    refresher: Refresher,
    metrics: Arc<Metrics>,
}

impl Orchestrator {
    /// Create a new orchestrator over the given leaves
    pub fn new(
        config: OrchestratorConfig,
        releases: ReleaseManagerRef,
        cluster: ClusterStatusProviderRef,
        catalog: CatalogStoreRef,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        let refresher = Refresher::new(
            releases.clone(),
            cluster.clone(),
            metrics.clone(),
            config.call_timeout,
        );

        Arc::new(Self {
            config,
            releases,
            cluster,
            catalog,
            refresher,
            metrics,
        })
    }

    /// Install a release for `spec` and record it
    ///
    /// Nothing is persisted when validation or the install fails, and a
    /// failed or timed out install is uninstalled. If the catalog insert
    /// fails the release is uninstalled again.
    #[instrument(skip(self, spec), fields(name = %spec.name))]
    pub async fn create_storage(&self, spec: StorageSpec) -> Result<StorageRecord> {
        let started = Instant::now();
        let result = self.create(spec).await;
        self.metrics
            .observe_operation("create", result.is_ok(), started.elapsed());
        result
    }

    async fn create(&self, mut spec: StorageSpec) -> Result<StorageRecord> {
        spec.validate()?;

        let chart = spec
            .chart
            .get_or_insert_with(|| self.config.default_chart.clone())
            .clone();
        let id = Uuid::new_v4();

        info!("Creating storage {} from chart {}", spec.name, chart);
        let installed = self.install(&chart, &spec).await?;

        let record = StorageRecord::new(id, &installed.release_name, spec);
        let (record, report) = self
            .refresher
            .after_install(record, &installed.manifest)
            .await;
        log_report(&record, &report);

        if let Err(err) = self
            .refresher
            .bounded("catalog insert", self.catalog.insert(&record))
            .await
        {
            error!(
                "Failed to record release {}, rolling back: {}",
                record.release_name, err
            );
            self.roll_back(&record.release_name).await;
            return Err(match err {
                Error::Persistence(_) => err,
                other => Error::Persistence(other.to_string()),
            });
        }

        info!("Created storage {} ({})", record.release_name, record.id);
        Ok(record)
    }

    /// Install under a fresh release name, retrying name collisions
    ///
    /// Every other failure, including the deadline, is reported as
    /// `Error::Install` after the partial release is uninstalled.
    async fn install(&self, chart: &str, spec: &StorageSpec) -> Result<InstalledRelease> {
        let mut attempt = 1;
        loop {
            let release_name = self.releases.release_name(&spec.name);
            let result = bounded(
                self.config.install_timeout,
                "release install",
                self.releases.install(&release_name, chart, spec),
            )
            .await;

            match result {
                Ok(installed) => return Ok(installed),
                Err(Error::ReleaseNameInUse(name)) if attempt < MAX_NAME_ATTEMPTS => {
                    warn!("Release name {} taken, retrying", name);
                    attempt += 1;
                }
                Err(Error::ReleaseNameInUse(name)) => {
                    error!("No free release name for {}", spec.name);
                    return Err(Error::Install(format!(
                        "release name {} still in use after {} attempts",
                        name, MAX_NAME_ATTEMPTS
                    )));
                }
                Err(err) => {
                    error!("Install of {} as {} failed: {}", spec.name, release_name, err);
                    self.roll_back(&release_name).await;
                    return Err(match err {
                        Error::Install(_) => err,
                        other => Error::Install(other.to_string()),
                    });
                }
            }
        }
    }

    async fn roll_back(&self, release_name: &str) {
        match self
            .refresher
            .bounded("release uninstall", self.releases.uninstall(release_name))
            .await
        {
            Ok(()) => info!("Rolled back release {}", release_name),
            Err(e) if e.is_not_found() => debug!("Release {} already gone", release_name),
            Err(e) => error!(
                "Rollback of {} failed, release is orphaned: {}",
                release_name, e
            ),
        }
    }

    /// Every catalog record, refreshed against the cluster
    ///
    /// Returns one record per catalog entry, in catalog order.
    #[instrument(skip(self))]
    pub async fn list_storage(&self) -> Result<Vec<StorageRecord>> {
        let started = Instant::now();
        let result = self.list().await;
        self.metrics
            .observe_operation("list", result.is_ok(), started.elapsed());
        result
    }

    async fn list(&self) -> Result<Vec<StorageRecord>> {
        let records = self
            .refresher
            .bounded("catalog list", self.catalog.list())
            .await?;
        debug!("Refreshing {} records", records.len());

        let refreshed: Vec<StorageRecord> = stream::iter(records)
            .map(|record| self.refresh_and_persist(record))
            .buffered(self.config.list_concurrency.max(1))
            .collect()
            .await;
        Ok(refreshed)
    }

    /// One record, refreshed against the cluster
    #[instrument(skip(self))]
    pub async fn get_storage(&self, release_name: &str) -> Result<StorageRecord> {
        let started = Instant::now();
        let result = self.get(release_name).await;
        self.metrics
            .observe_operation("get", result.is_ok(), started.elapsed());
        result
    }

    async fn get(&self, release_name: &str) -> Result<StorageRecord> {
        let record = self
            .refresher
            .bounded("catalog get", self.catalog.get(release_name))
            .await?;
        Ok(self.refresh_and_persist(record).await)
    }

    /// Full refresh; a failed write is logged and counted, the working copy
    /// is returned either way
    async fn refresh_and_persist(&self, record: StorageRecord) -> StorageRecord {
        let (record, report) = self.refresher.full(record).await;
        log_report(&record, &report);

        if let Err(e) = self
            .refresher
            .bounded("catalog update", self.catalog.update(&record))
            .await
        {
            warn!("Failed to persist refresh of {}: {}", record.release_name, e);
            self.metrics.record_persistence_failure();
        }
        record
    }

    /// Uninstall the release and forget the record
    ///
    /// Absence of either is success; other failures are logged only.
    #[instrument(skip(self))]
    pub async fn delete_storage(&self, release_name: &str) -> Result<()> {
        let started = Instant::now();
        info!("Deleting storage {}", release_name);

        match self
            .refresher
            .bounded("release uninstall", self.releases.uninstall(release_name))
            .await
        {
            Ok(()) => info!("Uninstalled release {}", release_name),
            Err(e) if e.is_not_found() => debug!("Release {} not installed", release_name),
            Err(e) => warn!("Uninstall of {} failed: {}", release_name, e),
        }

        match self
            .refresher
            .bounded("catalog delete", self.catalog.delete(release_name))
            .await
        {
            Ok(()) => debug!("Removed catalog record {}", release_name),
            Err(e) if e.is_not_found() => debug!("No catalog record for {}", release_name),
            Err(e) => warn!("Catalog delete of {} failed: {}", release_name, e),
        }

        self.metrics
            .observe_operation("delete", true, started.elapsed());
        Ok(())
    }

    /// Health of each leaf
    pub async fn components_health(&self) -> BTreeMap<String, bool> {
        let (releases, cluster, catalog) = tokio::join!(
            self.refresher
                .bounded("release manager health", self.releases.health_check()),
            self.refresher
                .bounded("cluster health", self.cluster.health_check()),
            self.refresher
                .bounded("catalog health", self.catalog.health_check()),
        );

        let mut health = BTreeMap::new();
        health.insert("releaseManager".to_string(), releases.unwrap_or(false));
        health.insert("cluster".to_string(), cluster.unwrap_or(false));
        health.insert("catalog".to_string(), catalog.unwrap_or(false));
        health
    }

    /// Get overall orchestrator status
    pub async fn status(&self) -> OrchestratorStatus {
        let components = self.components_health().await;
        let records = self
            .refresher
            .bounded("catalog list", self.catalog.list())
            .await
            .unwrap_or_default();

        OrchestratorStatus {
            healthy: components.values().all(|&h| h),
            storage_count: records.len() as u64,
            degraded_count: records.iter().filter(|r| r.is_degraded()).count() as u64,
            default_chart: self.config.default_chart.clone(),
            components,
        }
    }
}

fn log_report(record: &StorageRecord, report: &RefreshReport) {
    if report.is_clean() {
        debug!("Refreshed {}", record.release_name);
        return;
    }
    let probes: Vec<&str> = report.failures.iter().map(|f| f.probe.as_str()).collect();
    info!(
        "Refreshed {} with stale fields: {}",
        record.release_name,
        probes.join(", ")
    );
    if let ResourcesState::Unavailable { reason } = &record.status.resources_state {
        debug!("{} resources unavailable: {}", record.release_name, reason);
    }
}

/// Orchestrator status summary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorStatus {
    pub healthy: bool,
    pub storage_count: u64,
    /// Records whose last refresh left a field stale
    pub degraded_count: u64,
    pub default_chart: String,
    pub components: BTreeMap<String, bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::testing::{FakeCluster, FakeReleases, FlakyCatalog};
    use crate::domain::ports::CatalogStore;
    use crate::domain::record::{Probe, WorkloadPhase};
    use assert_matches::assert_matches;
    use std::sync::atomic::Ordering;

    struct Harness {
        releases: Arc<FakeReleases>,
        cluster: Arc<FakeCluster>,
        catalog: Arc<FlakyCatalog>,
        metrics: Arc<Metrics>,
        orchestrator: Arc<Orchestrator>,
    }

    fn harness_with(releases: FakeReleases, config: OrchestratorConfig) -> Harness {
        let releases = Arc::new(releases);
        let cluster = Arc::new(FakeCluster::new());
        let catalog = Arc::new(FlakyCatalog::new());
        let metrics = Metrics::new().unwrap();
        let orchestrator = Orchestrator::new(
            config,
            releases.clone(),
            cluster.clone(),
            catalog.clone(),
            metrics.clone(),
        );
        Harness {
            releases,
            cluster,
            catalog,
            metrics,
            orchestrator,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeReleases::new(), OrchestratorConfig::default())
    }

    fn pg1() -> StorageSpec {
        StorageSpec::named("pg1").with_size("10Gi")
    }

    #[tokio::test]
    async fn test_create_pg1() {
        let h = harness_with(
            FakeReleases::new().with_next_name("pg1-7f3a"),
            OrchestratorConfig::default(),
        );

        let record = h.orchestrator.create_storage(pg1()).await.unwrap();

        assert_eq!(record.release_name, "pg1-7f3a");
        assert_eq!(record.resources.len(), 2);
        assert_eq!(record.spec.chart.as_deref(), Some("bitnami/postgresql"));
        assert_eq!(
            record.status.workload.as_ref().map(|w| w.phase),
            Some(WorkloadPhase::Ready)
        );
        assert_eq!(record.status.endpoints.len(), 1);
        assert!(record.status.volume_claims.is_empty());
        assert_eq!(h.cluster.claim_calls.load(Ordering::SeqCst), 0);

        let stored = h.catalog.get("pg1-7f3a").await.unwrap();
        assert_eq!(stored.id, record.id);
        assert_eq!(h.metrics.operation_count("create", true), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_spec() {
        let h = harness();

        let err = h
            .orchestrator
            .create_storage(StorageSpec::named("PG_1"))
            .await
            .unwrap_err();

        assert_matches!(err, Error::Validation(_));
        assert_eq!(h.releases.install_calls.load(Ordering::SeqCst), 0);
        assert!(h.catalog.inner.is_empty());
    }

    #[tokio::test]
    async fn test_failed_install_persists_nothing() {
        let h = harness();
        h.releases.fail_install.store(true, Ordering::SeqCst);

        let err = h.orchestrator.create_storage(pg1()).await.unwrap_err();

        assert_matches!(err, Error::Install(_));
        assert_eq!(h.catalog.insert_calls.load(Ordering::SeqCst), 0);
        assert!(h.catalog.inner.is_empty());
        assert_eq!(h.releases.uninstall_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.metrics.operation_count("create", false), 1);
    }

    #[tokio::test]
    async fn test_values_cannot_bypass_replica_limit() {
        let h = harness();
        let mut spec = pg1();
        spec.values = serde_json::json!({ "replicaCount": 200000 })
            .as_object()
            .cloned()
            .unwrap();

        let err = h.orchestrator.create_storage(spec).await.unwrap_err();

        assert_matches!(err, Error::Validation(_));
        assert_eq!(h.releases.install_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_slow_install_is_install_failure_and_rolled_back() {
        let h = harness_with(
            FakeReleases::new().with_next_name("pg1-7f3a"),
            OrchestratorConfig {
                install_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        );
        *h.releases.install_delay.lock() = Some(Duration::from_millis(300));

        let err = h.orchestrator.create_storage(pg1()).await.unwrap_err();

        assert_matches!(err, Error::Install(ref reason) if reason.contains("Timed out after 50ms"));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
        assert!(!h.releases.contains("pg1-7f3a"));
        assert_eq!(h.releases.uninstall_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.catalog.insert_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_taken_release_name_is_retried() {
        let h = harness_with(
            FakeReleases::new()
                .with_next_name("pg1-aaaa")
                .with_next_name("pg1-bbbb")
                .with_next_name("pg1-cccc"),
            OrchestratorConfig::default(),
        );
        h.releases.name_collisions.store(2, Ordering::SeqCst);

        let record = h.orchestrator.create_storage(pg1()).await.unwrap();

        assert_eq!(record.release_name, "pg1-cccc");
        assert_eq!(h.releases.install_calls.load(Ordering::SeqCst), 3);
        assert_eq!(h.releases.uninstall_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exhausted_release_names_fail_install() {
        let h = harness();
        h.releases
            .name_collisions
            .store(MAX_NAME_ATTEMPTS, Ordering::SeqCst);

        let err = h.orchestrator.create_storage(pg1()).await.unwrap_err();

        assert_matches!(err, Error::Install(_));
        assert_eq!(
            h.releases.install_calls.load(Ordering::SeqCst),
            MAX_NAME_ATTEMPTS
        );
        assert_eq!(h.releases.uninstall_calls.load(Ordering::SeqCst), 0);
        assert!(h.catalog.inner.is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_manifest_degrades_record() {
        let h = harness();
        *h.releases.install_manifest_override.lock() = Some("kind: [broken".into());

        let record = h.orchestrator.create_storage(pg1()).await.unwrap();

        assert!(record.resources.is_empty());
        assert_matches!(
            record.status.resources_state,
            ResourcesState::Unavailable { .. }
        );
        assert!(record
            .status
            .probe_failures
            .iter()
            .any(|f| f.probe == Probe::Resources));
        assert_eq!(h.catalog.inner.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_insert_rolls_back_release() {
        let h = harness_with(
            FakeReleases::new().with_next_name("pg1-7f3a"),
            OrchestratorConfig::default(),
        );
        h.catalog.fail_insert.store(true, Ordering::SeqCst);

        let err = h.orchestrator.create_storage(pg1()).await.unwrap_err();

        assert_matches!(err, Error::Persistence(_));
        assert!(!h.releases.contains("pg1-7f3a"));
        assert_eq!(h.releases.uninstall_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let h = harness();
        let record = h.orchestrator.create_storage(pg1()).await.unwrap();

        h.orchestrator
            .delete_storage(&record.release_name)
            .await
            .unwrap();
        h.orchestrator
            .delete_storage(&record.release_name)
            .await
            .unwrap();

        assert!(!h.releases.contains(&record.release_name));
        assert!(h.catalog.inner.is_empty());
        assert!(h
            .orchestrator
            .get_storage(&record.release_name)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_delete_unknown_release_succeeds() {
        let h = harness();
        h.orchestrator.delete_storage("nonexistent").await.unwrap();
        assert_eq!(h.metrics.operation_count("delete", true), 1);
    }

    #[tokio::test]
    async fn test_list_refreshes_every_record_in_order() {
        let h = harness();
        let mut names = Vec::new();
        for name in ["pg1", "pg2", "pg3"] {
            let record = h
                .orchestrator
                .create_storage(StorageSpec::named(name))
                .await
                .unwrap();
            names.push(record.release_name);
        }

        let records = h.orchestrator.list_storage().await.unwrap();

        let listed: Vec<_> = records.iter().map(|r| r.release_name.clone()).collect();
        assert_eq!(listed, names);
        assert_eq!(h.catalog.update_calls.load(Ordering::SeqCst), 3);
        assert_eq!(h.cluster.claim_calls.load(Ordering::SeqCst), 3);
        assert!(records.iter().all(|r| r.status.volume_claims.len() == 1));
    }

    #[tokio::test]
    async fn test_list_with_single_slot_still_completes() {
        let h = harness_with(
            FakeReleases::new(),
            OrchestratorConfig {
                list_concurrency: 0,
                ..Default::default()
            },
        );
        for name in ["pg1", "pg2"] {
            h.orchestrator
                .create_storage(StorageSpec::named(name))
                .await
                .unwrap();
        }

        assert_eq!(h.orchestrator.list_storage().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_survives_persistence_failures() {
        let h = harness();
        for name in ["pg1", "pg2"] {
            h.orchestrator
                .create_storage(StorageSpec::named(name))
                .await
                .unwrap();
        }
        h.catalog.fail_update.store(true, Ordering::SeqCst);

        let records = h.orchestrator.list_storage().await.unwrap();

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.status.volume_claims.len() == 1));
        assert_eq!(h.metrics.persistence_failure_count(), 2);
    }

    #[tokio::test]
    async fn test_get_tolerates_failing_probe() {
        let h = harness();
        let record = h.orchestrator.create_storage(pg1()).await.unwrap();
        h.cluster.fail_claims.store(true, Ordering::SeqCst);
        h.cluster.ready_replicas.store(0, Ordering::SeqCst);

        let record = h
            .orchestrator
            .get_storage(&record.release_name)
            .await
            .unwrap();

        assert_eq!(
            record.status.workload.as_ref().map(|w| w.phase),
            Some(WorkloadPhase::Unavailable)
        );
        assert_eq!(record.status.probe_failures.len(), 1);
        assert_eq!(record.status.probe_failures[0].probe, Probe::VolumeClaim);
        assert!(record.status.volume_claims.is_empty());

        let stored = h.catalog.get(&record.release_name).await.unwrap();
        assert_eq!(stored.status.probe_failures, record.status.probe_failures);
    }

    #[tokio::test]
    async fn test_get_with_unreachable_release_manager_keeps_resources() {
        let h = harness();
        let record = h.orchestrator.create_storage(pg1()).await.unwrap();
        h.releases.fail_manifest.store(true, Ordering::SeqCst);

        let record = h
            .orchestrator
            .get_storage(&record.release_name)
            .await
            .unwrap();

        assert_eq!(record.resources.len(), 2);
        assert_matches!(
            record.status.resources_state,
            ResourcesState::Unavailable { .. }
        );
        assert_eq!(record.status.volume_claims.len(), 1);
        assert!(record.is_degraded());
        assert_eq!(h.orchestrator.status().await.degraded_count, 1);
    }

    #[tokio::test]
    async fn test_get_and_list_agree() {
        let h = harness();
        let created = h.orchestrator.create_storage(pg1()).await.unwrap();

        let got = h
            .orchestrator
            .get_storage(&created.release_name)
            .await
            .unwrap();
        let listed = h.orchestrator.list_storage().await.unwrap();

        assert_eq!(listed.len(), 1);
        let listed = &listed[0];
        assert_eq!(listed.id, got.id);
        assert_eq!(listed.resources, got.resources);
        assert_eq!(listed.status.workload, got.status.workload);
        assert_eq!(listed.status.endpoints, got.status.endpoints);
        assert_eq!(listed.status.volume_claims, got.status.volume_claims);
        assert_eq!(listed.status.resources_state, got.status.resources_state);
    }

    #[tokio::test]
    async fn test_get_unknown_release_is_not_found() {
        let h = harness();
        let err = h.orchestrator.get_storage("ghost-0000").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(h.metrics.operation_count("get", false), 1);
    }

    #[tokio::test]
    async fn test_slow_probe_does_not_fail_get() {
        let h = harness_with(
            FakeReleases::new(),
            OrchestratorConfig {
                call_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        );
        let record = h.orchestrator.create_storage(pg1()).await.unwrap();
        *h.cluster.workload_delay.lock() = Some(Duration::from_millis(500));

        let record = h
            .orchestrator
            .get_storage(&record.release_name)
            .await
            .unwrap();

        assert_eq!(record.status.probe_failures.len(), 1);
        assert_eq!(record.status.probe_failures[0].probe, Probe::Workload);
        assert_eq!(
            record.status.workload.as_ref().map(|w| w.phase),
            Some(WorkloadPhase::Ready)
        );
    }

    #[tokio::test]
    async fn test_list_through_api_outlasts_slow_probes() {
        use crate::controlplane::{ApiServer, ApiServerConfig};
        use axum::body::{to_bytes, Body};
        use axum::http::{Request, StatusCode};
        use tower::ServiceExt;

        let h = harness_with(
            FakeReleases::new(),
            OrchestratorConfig {
                call_timeout: Duration::from_millis(50),
                list_concurrency: 1,
                ..Default::default()
            },
        );
        for name in ["pg1", "pg2"] {
            h.orchestrator
                .create_storage(StorageSpec::named(name))
                .await
                .unwrap();
        }
        *h.cluster.workload_delay.lock() = Some(Duration::from_millis(500));

        let app = ApiServer::new(ApiServerConfig::default(), h.orchestrator.clone()).app();
        let response = app
            .oneshot(Request::builder().uri("/v1/storage").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], 200);
        let records = body["data"].as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| r["status"]["probeFailures"][0]["probe"] == "workload"));
    }

    #[tokio::test]
    async fn test_status_summary() {
        let h = harness();
        h.orchestrator.create_storage(pg1()).await.unwrap();

        let status = h.orchestrator.status().await;

        assert!(status.healthy);
        assert_eq!(status.storage_count, 1);
        assert_eq!(status.degraded_count, 0);
        assert_eq!(status.components.len(), 3);
    }
}
