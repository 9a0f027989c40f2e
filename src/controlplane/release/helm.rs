//! Helm Release Manager
//!
//! Installs, inspects and uninstalls releases through the `helm` CLI.
//! Chart values are handed over as a JSON values file.

use super::generate_release_name;
use crate::domain::ports::{InstalledRelease, ReleaseManager};
use crate::domain::record::StorageSpec;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Helm adapter
#[derive(Debug, Clone)]
pub struct HelmConfig {
    /// Path or name of the helm binary
    pub helm_bin: String,
    /// Namespace releases are installed into
    pub namespace: String,
    /// kubeconfig context to use
    pub kube_context: Option<String>,
    /// Explicit kubeconfig file
    pub kubeconfig: Option<PathBuf>,
    /// Helm operation timeout (Go duration, e.g. "5m0s")
    pub timeout: Option<String>,
    /// Create the namespace on install if missing
    pub create_namespace: bool,
}

impl Default for HelmConfig {
    fn default() -> Self {
        Self {
            helm_bin: "helm".to_string(),
            namespace: "storage".to_string(),
            kube_context: None,
            kubeconfig: None,
            timeout: None,
            create_namespace: true,
        }
    }
}

// =============================================================================
// Helm Output
// =============================================================================

/// The subset of `helm install --output json` we read
#[derive(Debug, Deserialize)]
struct HelmReleaseOutput {
    name: String,
    #[serde(default)]
    manifest: Option<String>,
}

// =============================================================================
// Helm Release Manager
// =============================================================================

/// Release manager backed by the helm CLI
pub struct HelmReleaseManager {
    config: HelmConfig,
}

impl HelmReleaseManager {
    pub fn new(config: HelmConfig) -> Self {
        Self { config }
    }

    /// Arguments shared by every invocation
    fn global_args(&self) -> Vec<String> {
        let mut args = vec!["--namespace".to_string(), self.config.namespace.clone()];
        if let Some(context) = &self.config.kube_context {
            args.push("--kube-context".to_string());
            args.push(context.clone());
        }
        args
    }

    /// Arguments for installing `release_name` from `chart`
    fn install_args(&self, release_name: &str, chart: &str, values_path: &str) -> Vec<String> {
        let mut args = vec![
            "install".to_string(),
            release_name.to_string(),
            chart.to_string(),
            "--values".to_string(),
            values_path.to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        if self.config.create_namespace {
            args.push("--create-namespace".to_string());
        }
        if let Some(timeout) = &self.config.timeout {
            args.push("--timeout".to_string());
            args.push(timeout.clone());
        }
        args.extend(self.global_args());
        args
    }

    async fn run(&self, args: Vec<String>) -> Result<Output> {
        let mut cmd = Command::new(&self.config.helm_bin);
        cmd.args(&args).kill_on_drop(true);
        if let Some(kubeconfig) = &self.config.kubeconfig {
            cmd.env("KUBECONFIG", kubeconfig);
        }

        debug!("Running {} {}", self.config.helm_bin, args.join(" "));
        cmd.output().await.map_err(|e| Error::ReleaseManager {
            operation: args.first().cloned().unwrap_or_default(),
            reason: format!("failed to run {}: {}", self.config.helm_bin, e),
        })
    }
}

#[async_trait]
impl ReleaseManager for HelmReleaseManager {
    fn release_name(&self, base: &str) -> String {
        generate_release_name(base)
    }

    async fn install(
        &self,
        release_name: &str,
        chart: &str,
        spec: &StorageSpec,
    ) -> Result<InstalledRelease> {
        info!("Installing release {} from chart {}", release_name, chart);

        let values = serde_json::to_vec(&spec.chart_values())?;
        let values_file = tempfile::Builder::new()
            .prefix("storage-values-")
            .suffix(".json")
            .tempfile()
            .map_err(|e| Error::Install(format!("failed to create values file: {}", e)))?;
        tokio::fs::write(values_file.path(), values)
            .await
            .map_err(|e| Error::Install(format!("failed to write values file: {}", e)))?;

        let output = self
            .run(self.install_args(
                release_name,
                chart,
                &values_file.path().to_string_lossy(),
            ))
            .await
            .map_err(|e| Error::Install(e.to_string()))?;

        if !output.status.success() {
            let stderr = stderr_text(&output);
            if is_name_collision(&stderr) {
                warn!("Release name {} already in use", release_name);
                return Err(Error::ReleaseNameInUse(release_name.to_string()));
            }
            return Err(Error::Install(stderr));
        }

        let release = parse_release_output(&output.stdout)?;
        let manifest = match release.manifest {
            Some(manifest) => manifest,
            None => self
                .rendered_manifest(&release.name)
                .await
                .map_err(|e| Error::Install(format!("installed but unreadable: {}", e)))?,
        };

        Ok(InstalledRelease {
            release_name: release.name,
            manifest,
        })
    }

    async fn rendered_manifest(&self, release_name: &str) -> Result<String> {
        let mut args = vec![
            "get".to_string(),
            "manifest".to_string(),
            release_name.to_string(),
        ];
        args.extend(self.global_args());

        let output = self.run(args).await?;
        if !output.status.success() {
            return Err(classify_failure("get manifest", release_name, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn uninstall(&self, release_name: &str) -> Result<()> {
        info!("Uninstalling release {}", release_name);

        let mut args = vec!["uninstall".to_string(), release_name.to_string()];
        if let Some(timeout) = &self.config.timeout {
            args.push("--timeout".to_string());
            args.push(timeout.clone());
        }
        args.extend(self.global_args());

        let output = self.run(args).await?;
        if !output.status.success() {
            return Err(classify_failure("uninstall", release_name, &output));
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        let output = self
            .run(vec!["version".to_string(), "--short".to_string()])
            .await?;
        Ok(output.status.success())
    }
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

fn parse_release_output(stdout: &[u8]) -> Result<HelmReleaseOutput> {
    serde_json::from_slice(stdout)
        .map_err(|e| Error::Install(format!("failed to parse helm output: {}", e)))
}

fn is_name_collision(stderr: &str) -> bool {
    stderr.contains("cannot re-use a name that is still in use")
}

/// Map a failed helm invocation onto the error taxonomy
fn classify_failure(operation: &str, release_name: &str, output: &Output) -> Error {
    let stderr = stderr_text(output);
    if stderr.to_lowercase().contains("not found") {
        Error::not_found("Release", release_name)
    } else {
        Error::ReleaseManager {
            operation: operation.to_string(),
            reason: stderr,
        }
    }
}
