//! Kubernetes Status Provider
//!
//! Answers the status probes from the live cluster. Targets come from the
//! record's rendered resources; objects without a namespace fall back to the
//! configured release namespace. Transient API errors are retried with
//! exponential backoff.

use super::probe_error;
use crate::controlplane::manifest::{self, ObjectRef};
use crate::domain::ports::ClusterStatusProvider;
use crate::domain::record::{
    ClaimPhase, Exposure, Probe, ServiceEndpoint, StorageRecord, VolumeClaimStatus,
    WorkloadPhase, WorkloadStatus,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Node, PersistentVolumeClaim, Service};
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Kubernetes status provider
#[derive(Debug, Clone)]
pub struct KubeStatusConfig {
    /// Namespace used for rendered objects that do not name one
    pub namespace: String,
    /// Give up retrying a transient API error after this long
    pub retry_max_elapsed: Duration,
    /// kubeconfig context to use
    pub kube_context: Option<String>,
    /// Explicit kubeconfig file
    pub kubeconfig: Option<PathBuf>,
}

impl Default for KubeStatusConfig {
    fn default() -> Self {
        Self {
            namespace: "storage".to_string(),
            retry_max_elapsed: Duration::from_secs(10),
            kube_context: None,
            kubeconfig: None,
        }
    }
}

// =============================================================================
// Replica Counts
// =============================================================================

/// Replica counts of one workload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicaCounts {
    pub desired: i32,
    pub ready: i32,
    pub available: i32,
}

/// Replica counts of a Deployment
pub fn deployment_counts(deployment: &Deployment) -> ReplicaCounts {
    let status = deployment.status.as_ref();
    ReplicaCounts {
        desired: deployment
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(1),
        ready: status.and_then(|s| s.ready_replicas).unwrap_or(0),
        available: status.and_then(|s| s.available_replicas).unwrap_or(0),
    }
}

/// Replica counts of a StatefulSet
pub fn statefulset_counts(set: &StatefulSet) -> ReplicaCounts {
    let status = set.status.as_ref();
    ReplicaCounts {
        desired: set.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1),
        ready: status.and_then(|s| s.ready_replicas).unwrap_or(0),
        available: status.and_then(|s| s.available_replicas).unwrap_or(0),
    }
}

/// Fold per-workload counts into one status
pub fn aggregate_workloads(workloads: Vec<(String, ReplicaCounts)>) -> WorkloadStatus {
    let total = workloads
        .iter()
        .fold(ReplicaCounts::default(), |acc, (_, c)| ReplicaCounts {
            desired: acc.desired + c.desired,
            ready: acc.ready + c.ready,
            available: acc.available + c.available,
        });

    WorkloadStatus {
        phase: WorkloadPhase::from_counts(workloads.len(), total.desired, total.ready),
        workloads: workloads.into_iter().map(|(name, _)| name).collect(),
        desired_replicas: total.desired,
        ready_replicas: total.ready,
        available_replicas: total.available,
    }
}

// =============================================================================
// Endpoints
// =============================================================================

/// Whether any port of this Service is only reachable through a node
pub fn needs_node_address(service: &Service) -> bool {
    let Some(spec) = service.spec.as_ref() else {
        return false;
    };
    match spec.type_.as_deref() {
        Some("NodePort") => true,
        Some("LoadBalancer") => load_balancer_hosts(service).is_empty(),
        _ => false,
    }
}

fn load_balancer_hosts(service: &Service) -> Vec<String> {
    service
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .map(|ingress| {
            ingress
                .iter()
                .filter_map(|i| i.ip.clone().or_else(|| i.hostname.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Reachable endpoints of a Service
///
/// Preference order: load balancer ingress, node port on `node_address`,
/// then the in-cluster address.
pub fn endpoints_for_service(
    service: &Service,
    namespace: &str,
    node_address: Option<&str>,
) -> Vec<ServiceEndpoint> {
    let name = service.metadata.name.clone().unwrap_or_default();
    let Some(spec) = service.spec.as_ref() else {
        return Vec::new();
    };
    let ports = spec.ports.clone().unwrap_or_default();
    let lb_hosts = load_balancer_hosts(service);

    let cluster_host = match spec.cluster_ip.as_deref() {
        Some(ip) if !ip.is_empty() && ip != "None" => ip.to_string(),
        _ => format!("{}.{}.svc", name, namespace),
    };

    let mut endpoints = Vec::new();
    for port in &ports {
        let protocol = port.protocol.clone().unwrap_or_else(|| "TCP".to_string());

        if !lb_hosts.is_empty() {
            for host in &lb_hosts {
                endpoints.push(ServiceEndpoint {
                    service: name.clone(),
                    host: host.clone(),
                    port: port.port,
                    protocol: protocol.clone(),
                    exposure: Exposure::LoadBalancer,
                });
            }
            continue;
        }

        match (port.node_port, node_address) {
            (Some(node_port), Some(node)) => endpoints.push(ServiceEndpoint {
                service: name.clone(),
                host: node.to_string(),
                port: node_port,
                protocol,
                exposure: Exposure::NodePort,
            }),
            _ => endpoints.push(ServiceEndpoint {
                service: name.clone(),
                host: cluster_host.clone(),
                port: port.port,
                protocol,
                exposure: Exposure::ClusterIP,
            }),
        }
    }
    endpoints
}

/// Externally reachable address of the first node that has one
pub fn node_address(nodes: &[Node]) -> Option<String> {
    let addresses: Vec<_> = nodes
        .iter()
        .filter_map(|n| n.status.as_ref())
        .filter_map(|s| s.addresses.as_ref())
        .flatten()
        .collect();

    addresses
        .iter()
        .find(|a| a.type_ == "ExternalIP")
        .or_else(|| addresses.iter().find(|a| a.type_ == "InternalIP"))
        .map(|a| a.address.clone())
}

// =============================================================================
// Volume Claims
// =============================================================================

/// Status of a claim, or `Missing` when the claim does not exist
pub fn claim_status(name: &str, claim: Option<&PersistentVolumeClaim>) -> VolumeClaimStatus {
    let Some(claim) = claim else {
        return VolumeClaimStatus {
            name: name.to_string(),
            phase: ClaimPhase::Missing,
            capacity: None,
            storage_class: None,
        };
    };

    let status = claim.status.as_ref();
    let phase = match status.and_then(|s| s.phase.as_deref()) {
        Some("Bound") => ClaimPhase::Bound,
        Some("Lost") => ClaimPhase::Lost,
        _ => ClaimPhase::Pending,
    };

    VolumeClaimStatus {
        name: name.to_string(),
        phase,
        capacity: status
            .and_then(|s| s.capacity.as_ref())
            .and_then(|c| c.get("storage"))
            .map(|q| q.0.clone()),
        storage_class: claim
            .spec
            .as_ref()
            .and_then(|s| s.storage_class_name.clone()),
    }
}

// =============================================================================
// Kube Status Provider
// =============================================================================

/// Status provider backed by the Kubernetes API
pub struct KubeStatusProvider {
    client: Client,
    config: KubeStatusConfig,
}

impl KubeStatusProvider {
    pub fn new(client: Client, config: KubeStatusConfig) -> Self {
        Self { client, config }
    }

    /// Connect using the configured kubeconfig and context, falling back
    /// to the ambient kubeconfig or in-cluster credentials
    pub async fn connect(config: KubeStatusConfig) -> Result<Self> {
        let options = KubeConfigOptions {
            context: config.kube_context.clone(),
            ..Default::default()
        };

        let client_config = match (&config.kubeconfig, &options.context) {
            (Some(path), _) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    Error::Configuration(format!("failed to read {}: {}", path.display(), e))
                })?;
                kube::Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .map_err(|e| Error::Configuration(e.to_string()))?
            }
            (None, Some(_)) => kube::Config::from_kubeconfig(&options)
                .await
                .map_err(|e| Error::Configuration(e.to_string()))?,
            (None, None) => kube::Config::infer()
                .await
                .map_err(|e| Error::Configuration(e.to_string()))?,
        };

        let client = Client::try_from(client_config)?;
        Ok(Self::new(client, config))
    }

    fn namespace_of<'a>(&'a self, object: &'a ObjectRef) -> &'a str {
        object
            .namespace
            .as_deref()
            .unwrap_or(&self.config.namespace)
    }

    fn api<K>(&self, object: &ObjectRef) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), self.namespace_of(object))
    }

    /// Run a kube call, retrying transient failures
    async fn with_retry<T, F, Fut>(&self, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, kube::Error>>,
    {
        let policy = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(self.config.retry_max_elapsed))
            .build();

        backoff::future::retry(policy, || {
            let fut = call();
            async move {
                fut.await.map_err(|e| {
                    let err = Error::from(e);
                    if err.is_transient() {
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            }
        })
        .await
    }

    async fn workload_counts(&self, object: &ObjectRef) -> Result<ReplicaCounts> {
        match object.kind.as_str() {
            "Deployment" => {
                let api: Api<Deployment> = self.api(object);
                let deployment = self.with_retry(|| api.get(&object.name)).await?;
                Ok(deployment_counts(&deployment))
            }
            "StatefulSet" => {
                let api: Api<StatefulSet> = self.api(object);
                let set = self.with_retry(|| api.get(&object.name)).await?;
                Ok(statefulset_counts(&set))
            }
            other => Err(Error::Internal(format!("unsupported workload kind {}", other))),
        }
    }

    async fn first_node_address(&self) -> Result<Option<String>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let params = ListParams::default().limit(50);
        let nodes = self.with_retry(|| api.list(&params)).await?;
        Ok(node_address(&nodes.items))
    }
}

#[async_trait]
impl ClusterStatusProvider for KubeStatusProvider {
    async fn workload_status(&self, record: &StorageRecord) -> Result<WorkloadStatus> {
        let mut counts = Vec::new();
        for object in manifest::workloads(&record.resources) {
            let c = self
                .workload_counts(&object)
                .await
                .map_err(|e| probe_error(Probe::Workload, e))?;
            debug!("{} ready {}/{}", object, c.ready, c.desired);
            counts.push((object.to_string(), c));
        }
        Ok(aggregate_workloads(counts))
    }

    async fn service_endpoints(&self, record: &StorageRecord) -> Result<Vec<ServiceEndpoint>> {
        let mut fetched = Vec::new();
        for object in manifest::services(&record.resources) {
            let api: Api<Service> = self.api(&object);
            let service = self
                .with_retry(|| api.get(&object.name))
                .await
                .map_err(|e| probe_error(Probe::ServiceEndpoint, e))?;
            fetched.push((self.namespace_of(&object).to_string(), service));
        }

        let node = if fetched.iter().any(|(_, s)| needs_node_address(s)) {
            self.first_node_address()
                .await
                .map_err(|e| probe_error(Probe::ServiceEndpoint, e))?
        } else {
            None
        };

        Ok(fetched
            .iter()
            .flat_map(|(ns, s)| endpoints_for_service(s, ns, node.as_deref()))
            .collect())
    }

    async fn volume_claim_status(&self, record: &StorageRecord) -> Result<Vec<VolumeClaimStatus>> {
        let mut claims = Vec::new();
        for object in manifest::volume_claims(&record.resources) {
            let api: Api<PersistentVolumeClaim> = self.api(&object);
            let claim = self
                .with_retry(|| api.get_opt(&object.name))
                .await
                .map_err(|e| probe_error(Probe::VolumeClaim, e))?;
            claims.push(claim_status(&object.name, claim.as_ref()));
        }
        Ok(claims)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.client.apiserver_version().await.is_ok())
    }
}
