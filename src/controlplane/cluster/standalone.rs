//! Standalone Status Provider
//!
//! Reports every rendered workload as fully ready, every Service on its
//! in-cluster DNS name and every claim as bound. Pairs with the in-memory
//! release manager when no cluster is available.

use crate::controlplane::manifest::{self, kind_of};
use crate::domain::ports::ClusterStatusProvider;
use crate::domain::record::{
    ClaimPhase, Exposure, ServiceEndpoint, StorageRecord, VolumeClaimStatus, WorkloadPhase,
    WorkloadStatus,
};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Status provider that trusts the rendered manifest
pub struct StaticStatusProvider {
    namespace: String,
}

impl StaticStatusProvider {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl ClusterStatusProvider for StaticStatusProvider {
    async fn workload_status(&self, record: &StorageRecord) -> Result<WorkloadStatus> {
        let mut names = Vec::new();
        let mut replicas = 0;

        for resource in record
            .resources
            .iter()
            .filter(|r| matches!(kind_of(r), Some("Deployment" | "StatefulSet")))
        {
            let declared = resource
                .get("spec")
                .and_then(|s| s.get("replicas"))
                .and_then(Value::as_i64)
                .unwrap_or(1);
            replicas = i32::try_from(declared.max(0))
                .map_or(i32::MAX, |n| n.saturating_add(replicas));
        }
        for object in manifest::workloads(&record.resources) {
            names.push(object.to_string());
        }

        Ok(WorkloadStatus {
            phase: WorkloadPhase::from_counts(names.len(), replicas, replicas),
            workloads: names,
            desired_replicas: replicas,
            ready_replicas: replicas,
            available_replicas: replicas,
        })
    }

    async fn service_endpoints(&self, record: &StorageRecord) -> Result<Vec<ServiceEndpoint>> {
        let mut endpoints = Vec::new();

        for resource in record
            .resources
            .iter()
            .filter(|r| kind_of(r) == Some("Service"))
        {
            let metadata = resource.get("metadata");
            let name = metadata
                .and_then(|m| m.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let namespace = metadata
                .and_then(|m| m.get("namespace"))
                .and_then(Value::as_str)
                .unwrap_or(&self.namespace);
            let ports = resource
                .get("spec")
                .and_then(|s| s.get("ports"))
                .and_then(Value::as_array);

            for port in ports.into_iter().flatten() {
                endpoints.push(ServiceEndpoint {
                    service: name.to_string(),
                    host: format!("{}.{}.svc", name, namespace),
                    port: port
                        .get("port")
                        .and_then(Value::as_i64)
                        .and_then(|p| i32::try_from(p).ok())
                        .unwrap_or(0),
                    protocol: port
                        .get("protocol")
                        .and_then(Value::as_str)
                        .unwrap_or("TCP")
                        .to_string(),
                    exposure: Exposure::ClusterIP,
                });
            }
        }

        Ok(endpoints)
    }

    async fn volume_claim_status(&self, record: &StorageRecord) -> Result<Vec<VolumeClaimStatus>> {
        Ok(manifest::volume_claims(&record.resources)
            .into_iter()
            .map(|claim| VolumeClaimStatus {
                name: claim.name,
                phase: ClaimPhase::Bound,
                capacity: record.spec.size.clone(),
                storage_class: record.spec.storage_class.clone(),
            })
            .collect())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
