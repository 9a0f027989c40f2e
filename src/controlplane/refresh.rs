//! Record Refresh
//!
//! Threads a [`StorageRecord`] through a fixed sequence of steps. Each step
//! takes the record by value, asks one source of truth for a fresh value of
//! one field and hands the record back together with the failures seen so
//! far. A failing step leaves its field untouched.

use crate::controlplane::manifest::decode_manifest;
use crate::domain::ports::{ClusterStatusProviderRef, ReleaseManagerRef};
use crate::domain::record::{Probe, ProbeFailure, ResourcesState, StorageRecord};
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Failures collected while refreshing one record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub failures: Vec<ProbeFailure>,
}

impl RefreshReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed(&self, probe: Probe) -> bool {
        self.failures.iter().any(|f| f.probe == probe)
    }

    fn push(&mut self, probe: Probe, reason: String) {
        self.failures.push(ProbeFailure { probe, reason });
    }
}

/// Runs refresh steps against the release manager and the cluster
pub struct Refresher {
    releases: ReleaseManagerRef,
    cluster: ClusterStatusProviderRef,
    metrics: Arc<Metrics>,
    call_timeout: Duration,
}

impl Refresher {
    pub fn new(
        releases: ReleaseManagerRef,
        cluster: ClusterStatusProviderRef,
        metrics: Arc<Metrics>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            releases,
            cluster,
            metrics,
            call_timeout,
        }
    }

    /// Run one external call under the call timeout
    pub async fn bounded<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        bounded(self.call_timeout, operation, call).await
    }

    /// Refresh a freshly installed release from its install-time manifest
    ///
    /// Volume claims are skipped; they are rarely bound this early.
    pub async fn after_install(
        &self,
        record: StorageRecord,
        manifest: &str,
    ) -> (StorageRecord, RefreshReport) {
        let (record, report) =
            apply_manifest(record, manifest, RefreshReport::default(), &self.metrics);
        let (record, report) = self.workload(record, report).await;
        let (record, report) = self.endpoints(record, report).await;
        stamp(record, report)
    }

    /// Re-read the manifest, then run every status probe
    pub async fn full(&self, record: StorageRecord) -> (StorageRecord, RefreshReport) {
        let (record, report) = self.resources(record, RefreshReport::default()).await;
        let (record, report) = self.workload(record, report).await;
        let (record, report) = self.endpoints(record, report).await;
        let (record, report) = self.volume_claims(record, report).await;
        stamp(record, report)
    }

    /// Re-fetch and decode the release's rendered manifest
    pub async fn resources(
        &self,
        record: StorageRecord,
        mut report: RefreshReport,
    ) -> (StorageRecord, RefreshReport) {
        let fetched = self
            .bounded(
                "rendered manifest",
                self.releases.rendered_manifest(&record.release_name),
            )
            .await;

        match fetched {
            Ok(raw) => apply_manifest(record, &raw, report, &self.metrics),
            Err(err) => {
                let mut record = record;
                self.fail(&record.release_name, Probe::Resources, &err, &mut report);
                record.status.resources_state = ResourcesState::Unavailable {
                    reason: failure_reason(&err),
                };
                (record, report)
            }
        }
    }

    pub async fn workload(
        &self,
        mut record: StorageRecord,
        mut report: RefreshReport,
    ) -> (StorageRecord, RefreshReport) {
        match self
            .bounded("workload status", self.cluster.workload_status(&record))
            .await
        {
            Ok(workload) => {
                debug!(
                    "{}: workload {:?} ({}/{} ready)",
                    record.release_name,
                    workload.phase,
                    workload.ready_replicas,
                    workload.desired_replicas
                );
                record.status.workload = Some(workload);
            }
            Err(err) => self.fail(&record.release_name, Probe::Workload, &err, &mut report),
        }
        (record, report)
    }

    pub async fn endpoints(
        &self,
        mut record: StorageRecord,
        mut report: RefreshReport,
    ) -> (StorageRecord, RefreshReport) {
        match self
            .bounded("service endpoints", self.cluster.service_endpoints(&record))
            .await
        {
            Ok(endpoints) => {
                debug!("{}: {} endpoints", record.release_name, endpoints.len());
                record.status.endpoints = endpoints;
            }
            Err(err) => self.fail(
                &record.release_name,
                Probe::ServiceEndpoint,
                &err,
                &mut report,
            ),
        }
        (record, report)
    }

    pub async fn volume_claims(
        &self,
        mut record: StorageRecord,
        mut report: RefreshReport,
    ) -> (StorageRecord, RefreshReport) {
        match self
            .bounded(
                "volume claim status",
                self.cluster.volume_claim_status(&record),
            )
            .await
        {
            Ok(claims) => {
                debug!("{}: {} volume claims", record.release_name, claims.len());
                record.status.volume_claims = claims;
            }
            Err(err) => self.fail(&record.release_name, Probe::VolumeClaim, &err, &mut report),
        }
        (record, report)
    }

    fn fail(&self, release_name: &str, probe: Probe, err: &Error, report: &mut RefreshReport) {
        warn!("{}: {} refresh failed: {}", release_name, probe, err);
        self.metrics.record_probe_failure(probe.as_str());
        report.push(probe, failure_reason(err));
    }
}

/// Decode `raw` into the record's resources
///
/// On failure the previous resources are kept and the record is marked
/// [`ResourcesState::Unavailable`].
pub fn apply_manifest(
    mut record: StorageRecord,
    raw: &str,
    mut report: RefreshReport,
    metrics: &Metrics,
) -> (StorageRecord, RefreshReport) {
    match decode_manifest(raw) {
        Ok(resources) => {
            record.resources = resources;
            record.status.resources_state = ResourcesState::Current;
        }
        Err(err) => {
            warn!(
                "{}: rendered resources could not be decoded, release may be orphaned: {}",
                record.release_name, err
            );
            metrics.record_probe_failure(Probe::Resources.as_str());
            let reason = failure_reason(&err);
            report.push(Probe::Resources, reason.clone());
            record.status.resources_state = ResourcesState::Unavailable { reason };
        }
    }
    (record, report)
}

fn stamp(mut record: StorageRecord, report: RefreshReport) -> (StorageRecord, RefreshReport) {
    let now = Utc::now();
    record.status.last_refreshed = Some(now);
    record.status.probe_failures = report.failures.clone();
    record.updated_at = now;
    (record, report)
}

/// Run `call`, failing with [`Error::Timeout`] once `limit` elapses
pub async fn bounded<T, F>(limit: Duration, operation: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: operation.to_string(),
            limit,
        }),
    }
}

/// Reason text stored on the record, without the probe prefix
fn failure_reason(err: &Error) -> String {
    match err {
        Error::StatusProbe { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}
