//! Helm adapter
//!
//! Installs are `helm upgrade --install`, so re-running an install
//! reconciles an existing release instead of failing.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use lakelab_common::{Error, Result};

use crate::command::{CommandOutput, CommandRunner, Invocation};

/// Parameters of a release install
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallRequest {
    /// Release name
    pub release: String,
    /// Chart reference
    pub chart: String,
    /// Target namespace
    pub namespace: String,
    /// Pinned chart version
    pub version: Option<String>,
    /// Values file
    pub values_file: Option<PathBuf>,
    /// Block until resources are ready
    pub wait: bool,
    /// Upper bound for `wait`
    pub timeout: Duration,
}

/// One entry of `helm list`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    /// Release name
    pub name: String,
    /// Namespace
    pub namespace: String,
    /// Status (deployed, failed, pending-install, ...)
    pub status: String,
    /// Chart name and version
    #[serde(default)]
    pub chart: String,
}

#[derive(Deserialize)]
struct StatusDoc {
    info: StatusInfo,
}

#[derive(Deserialize)]
struct StatusInfo {
    status: String,
}

/// Runs helm against one kubeconfig
pub struct Helm {
    runner: Arc<dyn CommandRunner>,
    kubeconfig: PathBuf,
}

fn is_release_not_found(out: &CommandOutput) -> bool {
    out.error_text().contains("release: not found")
}

impl Helm {
    /// Create an adapter for the cluster behind `kubeconfig`
    pub fn new(runner: Arc<dyn CommandRunner>, kubeconfig: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            kubeconfig: kubeconfig.into(),
        }
    }

    fn helm(&self) -> Invocation {
        Invocation::new("helm").args(["--kubeconfig".to_string(), self.kubeconfig.display().to_string()])
    }

    /// Install or upgrade a release
    pub async fn install(&self, req: &InstallRequest) -> Result<()> {
        let mut inv = self.helm().args([
            "upgrade",
            "--install",
            req.release.as_str(),
            req.chart.as_str(),
            "--namespace",
            req.namespace.as_str(),
            "--create-namespace",
        ]);
        if let Some(version) = &req.version {
            inv = inv.args(["--version", version.as_str()]);
        }
        if let Some(values) = &req.values_file {
            inv = inv.arg("-f").arg(values.display().to_string());
        }
        if req.wait {
            inv = inv
                .arg("--wait")
                .arg("--timeout")
                .arg(format!("{}s", req.timeout.as_secs()));
        }

        info!(release = %req.release, chart = %req.chart, namespace = %req.namespace, "installing release");
        let out = self.runner.run(inv).await?;
        if !out.success {
            return Err(Error::deployment_for(&req.release, out.error_text()));
        }
        Ok(())
    }

    /// Uninstall; a release that does not exist is success
    pub async fn uninstall(&self, release: &str, namespace: &str) -> Result<()> {
        let inv = self
            .helm()
            .args(["uninstall", release, "--namespace", namespace]);
        let out = self.runner.run(inv).await?;
        if out.success {
            info!(release = %release, namespace = %namespace, "uninstalled release");
            return Ok(());
        }
        if is_release_not_found(&out) {
            debug!(release = %release, "release already absent");
            return Ok(());
        }
        Err(Error::deployment_for(release, out.error_text()))
    }

    /// Release status, `None` when the release does not exist
    pub async fn status(&self, release: &str, namespace: &str) -> Result<Option<String>> {
        let inv = self
            .helm()
            .args(["status", release, "--namespace", namespace, "-o", "json"]);
        let out = self.runner.run(inv).await?;
        if !out.success {
            if is_release_not_found(&out) {
                return Ok(None);
            }
            return Err(Error::deployment_for(release, out.error_text()));
        }
        let doc: StatusDoc = serde_json::from_str(&out.stdout)?;
        Ok(Some(doc.info.status))
    }

    /// Releases in `namespace`, or across all namespaces
    pub async fn list(&self, namespace: Option<&str>) -> Result<Vec<ReleaseInfo>> {
        let mut inv = self.helm().args(["list", "-o", "json"]);
        inv = match namespace {
            Some(ns) => inv.args(["--namespace", ns]),
            None => inv.arg("--all-namespaces"),
        };
        let out = self.runner.run(inv).await?;
        if !out.success {
            return Err(Error::deployment_for("helm list", out.error_text()));
        }
        Ok(serde_json::from_str(&out.stdout)?)
    }
}
