//! Storage records and their specification
//!
//! A [`StorageRecord`] is the catalog's view of one provisioned storage
//! instance: the validated [`StorageSpec`] it was created from, the release
//! that materializes it, the last rendered resources of that release and a
//! status snapshot merged from the cluster.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Longest storage name accepted; the release suffix must still fit in
/// Helm's 53 character release name limit.
pub const MAX_NAME_LEN: usize = 40;

/// Upper bound on requested replicas
pub const MAX_REPLICAS: u32 = 16;

/// One rendered Kubernetes object, schema decided by the chart
pub type RenderedResource = Map<String, Value>;

// =============================================================================
// Storage Specification
// =============================================================================

/// Client supplied parameters for a new storage instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Base name, also the prefix of the generated release name
    pub name: String,
    /// Chart reference; the operator default is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<String>,
    /// Requested volume size (e.g. "10Gi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Storage class for the volume claims
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    /// Replica count of the storage workload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    /// Extra chart values, merged over the generated ones
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub values: Map<String, Value>,
}

impl StorageSpec {
    /// Minimal spec with only a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chart: None,
            size: None,
            storage_class: None,
            replicas: None,
            values: Map::new(),
        }
    }

    /// Set the requested size
    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    /// Validate the spec before anything is installed
    pub fn validate(&self) -> Result<()> {
        validate_dns_label(&self.name)?;

        if let Some(chart) = &self.chart {
            if chart.trim().is_empty() {
                return Err(Error::Validation("chart must not be empty".into()));
            }
        }

        if let Some(bytes) = self.size_bytes()? {
            if bytes == 0 {
                return Err(Error::Validation("size must be greater than zero".into()));
            }
        }

        // `values` may override the typed field, so check what the chart sees
        if let Some(replicas) = self.chart_values().get("replicaCount") {
            match replicas.as_u64() {
                Some(n) if (1..=u64::from(MAX_REPLICAS)).contains(&n) => {}
                _ => {
                    return Err(Error::Validation(format!(
                        "replicas must be between 1 and {}, got {}",
                        MAX_REPLICAS, replicas
                    )))
                }
            }
        }

        if let Some(class) = &self.storage_class {
            if class.trim().is_empty() {
                return Err(Error::Validation("storageClass must not be empty".into()));
            }
        }

        Ok(())
    }

    /// Requested size in bytes, if any
    pub fn size_bytes(&self) -> Result<Option<u64>> {
        self.size.as_deref().map(parse_capacity).transpose()
    }

    /// Chart values generated from the typed fields with the free-form
    /// `values` deep-merged on top
    pub fn chart_values(&self) -> Value {
        let mut generated = Map::new();

        let mut persistence = Map::new();
        persistence.insert("enabled".into(), Value::Bool(true));
        if let Some(size) = &self.size {
            persistence.insert("size".into(), Value::String(size.clone()));
        }
        if let Some(class) = &self.storage_class {
            persistence.insert("storageClass".into(), Value::String(class.clone()));
        }
        generated.insert("persistence".into(), Value::Object(persistence));

        if let Some(replicas) = self.replicas {
            generated.insert("replicaCount".into(), Value::from(replicas));
        }

        let mut values = Value::Object(generated);
        merge_values(&mut values, Value::Object(self.values.clone()));
        values
    }
}

/// Check that `name` is a lowercase RFC 1123 label short enough to carry a
/// release suffix
fn validate_dns_label(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation("name must not be empty".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::Validation(format!(
            "name must be at most {} characters, got {}",
            MAX_NAME_LEN,
            name.len()
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(Error::Validation(format!(
            "name '{}' may only contain lowercase letters, digits and '-'",
            name
        )));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(Error::Validation(format!(
            "name '{}' must start and end with an alphanumeric character",
            name
        )));
    }
    Ok(())
}

/// Deep-merge `overlay` into `base`; objects merge key by key, anything
/// else is replaced
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Parse a Kubernetes style quantity (e.g. "100Gi", "1Ti") to bytes
pub fn parse_capacity(s: &str) -> Result<u64> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::CapacityParse("empty capacity string".into()));
    }

    let num_end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit() && *c != '.')
        .map(|(i, _)| i)
        .unwrap_or(s.len());

    let num_str = &s[..num_end];
    let unit_str = s[num_end..].trim();

    let num: f64 = num_str
        .parse()
        .map_err(|_| Error::CapacityParse(format!("invalid number: {}", num_str)))?;

    let multiplier: u64 = match unit_str {
        "" => 1,
        "k" | "K" => 1000,
        "M" => 1000 * 1000,
        "G" => 1000 * 1000 * 1000,
        "T" => 1000 * 1000 * 1000 * 1000,
        "Ki" => 1024,
        "Mi" => 1024 * 1024,
        "Gi" => 1024 * 1024 * 1024,
        "Ti" => 1024 * 1024 * 1024 * 1024,
        "Pi" => 1024 * 1024 * 1024 * 1024 * 1024,
        _ => {
            return Err(Error::CapacityParse(format!(
                "unknown unit: {}",
                unit_str
            )))
        }
    };

    Ok((num * multiplier as f64) as u64)
}

// =============================================================================
// Status Types
// =============================================================================

/// Coarse readiness of the release's workloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkloadPhase {
    Ready,
    Progressing,
    Unavailable,
    Unknown,
}

impl WorkloadPhase {
    /// Derive the phase from aggregated replica counts
    pub fn from_counts(workloads: usize, desired: i32, ready: i32) -> Self {
        if workloads == 0 {
            WorkloadPhase::Unknown
        } else if ready >= desired {
            WorkloadPhase::Ready
        } else if ready == 0 {
            WorkloadPhase::Unavailable
        } else {
            WorkloadPhase::Progressing
        }
    }
}

/// Aggregated readiness of every Deployment/StatefulSet in a release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadStatus {
    /// Workloads inspected, as `Kind/name`
    pub workloads: Vec<String>,
    pub desired_replicas: i32,
    pub ready_replicas: i32,
    pub available_replicas: i32,
    pub phase: WorkloadPhase,
}

/// How an endpoint is reachable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Exposure {
    LoadBalancer,
    NodePort,
    ClusterIP,
}

/// One reachable address of a release's Service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoint {
    pub service: String,
    pub host: String,
    pub port: i32,
    pub protocol: String,
    pub exposure: Exposure,
}

impl ServiceEndpoint {
    /// `host:port` form of the endpoint
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Binding state of a persistent volume claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimPhase {
    Pending,
    Bound,
    Lost,
    /// Claim named by the release does not exist (yet)
    Missing,
}

/// Status of one persistent volume claim belonging to the release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeClaimStatus {
    pub name: String,
    pub phase: ClaimPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

/// Whether `resources` reflects the release's current manifest
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ResourcesState {
    #[default]
    Current,
    /// Manifest could not be fetched or decoded; `resources` holds the last
    /// good copy, if any
    Unavailable { reason: String },
}

/// The status sources a refresh consults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Probe {
    Workload,
    ServiceEndpoint,
    VolumeClaim,
    Resources,
}

impl Probe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Probe::Workload => "workload",
            Probe::ServiceEndpoint => "service_endpoint",
            Probe::VolumeClaim => "volume_claim",
            Probe::Resources => "resources",
        }
    }
}

impl std::fmt::Display for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A probe that failed during the last refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeFailure {
    pub probe: Probe,
    pub reason: String,
}

/// Live status merged from the cluster
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStatus {
    #[serde(default)]
    pub workload: Option<WorkloadStatus>,
    #[serde(default)]
    pub endpoints: Vec<ServiceEndpoint>,
    #[serde(default)]
    pub volume_claims: Vec<VolumeClaimStatus>,
    #[serde(default)]
    pub resources_state: ResourcesState,
    #[serde(default)]
    pub last_refreshed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub probe_failures: Vec<ProbeFailure>,
}

// =============================================================================
// Storage Record
// =============================================================================

/// Catalog entry for one provisioned storage instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageRecord {
    pub id: Uuid,
    pub release_name: String,
    pub spec: StorageSpec,
    #[serde(default)]
    pub resources: Vec<RenderedResource>,
    #[serde(default)]
    pub status: StorageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StorageRecord {
    /// Record for a release that has just been installed
    pub fn new(id: Uuid, release_name: impl Into<String>, spec: StorageSpec) -> Self {
        let now = Utc::now();
        Self {
            id,
            release_name: release_name.into(),
            spec,
            resources: Vec::new(),
            status: StorageStatus::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the last refresh left any field stale
    pub fn is_degraded(&self) -> bool {
        !self.status.probe_failures.is_empty()
            || matches!(self.status.resources_state, ResourcesState::Unavailable { .. })
    }
}
