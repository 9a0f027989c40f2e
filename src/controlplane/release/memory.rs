//! In-Memory Release Manager
//!
//! Renders a synthetic release (StatefulSet, Service and the values the spec
//! asks for) without touching a cluster. Backs standalone mode.

use super::generate_release_name;
use crate::domain::ports::{InstalledRelease, ReleaseManager};
use crate::domain::record::StorageSpec;
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::info;

/// Port the synthetic Service exposes
pub const SYNTHETIC_PORT: i32 = 5432;

/// Release manager that keeps rendered releases in memory
pub struct InMemoryReleaseManager {
    namespace: String,
    /// Release name -> rendered manifest
    releases: DashMap<String, String>,
}

impl InMemoryReleaseManager {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            releases: DashMap::new(),
        }
    }

    /// Number of live releases
    pub fn release_count(&self) -> usize {
        self.releases.len()
    }

    /// Render the objects a storage chart would produce for `spec`
    fn render(&self, release_name: &str, chart: &str, spec: &StorageSpec) -> Result<String> {
        let values = spec.chart_values();
        let replicas = values
            .get("replicaCount")
            .and_then(Value::as_u64)
            .unwrap_or(1);
        let size = values
            .pointer("/persistence/size")
            .and_then(Value::as_str)
            .unwrap_or("8Gi");
        let storage_class = values
            .pointer("/persistence/storageClass")
            .cloned()
            .unwrap_or(Value::Null);

        let labels = json!({
            "app.kubernetes.io/instance": release_name,
            "app.kubernetes.io/name": spec.name,
            "helm.sh/chart": chart,
        });

        let service = json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": { "name": release_name, "namespace": self.namespace, "labels": labels },
            "spec": {
                "type": "ClusterIP",
                "selector": { "app.kubernetes.io/instance": release_name },
                "ports": [{ "name": "tcp", "port": SYNTHETIC_PORT, "protocol": "TCP" }]
            }
        });

        let statefulset = json!({
            "apiVersion": "apps/v1",
            "kind": "StatefulSet",
            "metadata": { "name": release_name, "namespace": self.namespace, "labels": labels },
            "spec": {
                "replicas": replicas,
                "serviceName": release_name,
                "selector": { "matchLabels": { "app.kubernetes.io/instance": release_name } },
                "volumeClaimTemplates": [{
                    "metadata": { "name": "data" },
                    "spec": {
                        "accessModes": ["ReadWriteOnce"],
                        "storageClassName": storage_class,
                        "resources": { "requests": { "storage": size } }
                    }
                }]
            }
        });

        let mut manifest = String::new();
        for object in [service, statefulset] {
            let document = serde_yaml::to_string(&object)
                .map_err(|e| Error::Install(format!("failed to render manifest: {}", e)))?;
            manifest.push_str("---\n");
            manifest.push_str(&document);
        }
        Ok(manifest)
    }
}

#[async_trait]
impl ReleaseManager for InMemoryReleaseManager {
    fn release_name(&self, base: &str) -> String {
        loop {
            let candidate = generate_release_name(base);
            if !self.releases.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    async fn install(
        &self,
        release_name: &str,
        chart: &str,
        spec: &StorageSpec,
    ) -> Result<InstalledRelease> {
        let manifest = self.render(release_name, chart, spec)?;
        match self.releases.entry(release_name.to_string()) {
            Entry::Occupied(_) => {
                return Err(Error::ReleaseNameInUse(release_name.to_string()));
            }
            Entry::Vacant(slot) => {
                slot.insert(manifest.clone());
            }
        }
        info!("Installed in-memory release {}", release_name);

        Ok(InstalledRelease {
            release_name: release_name.to_string(),
            manifest,
        })
    }

    async fn rendered_manifest(&self, release_name: &str) -> Result<String> {
        self.releases
            .get(release_name)
            .map(|m| m.value().clone())
            .ok_or_else(|| Error::not_found("Release", release_name))
    }

    async fn uninstall(&self, release_name: &str) -> Result<()> {
        self.releases
            .remove(release_name)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("Release", release_name))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
