//! Package/deployment executor boundary
//!
//! [`DeploymentGateway`] covers release install/uninstall and the
//! namespace/secret/pod primitives the orchestrator needs inside the
//! cluster. Uninstall and namespace creation are idempotent so teardown
//! and re-runs never trip over work that is already done.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use lakelab_common::Result;

use crate::cluster::{client_from_kubeconfig, ClusterInspector, NodeReadiness, PodState};
use crate::command::{require_tools, CommandRunner};
use crate::helm::{Helm, InstallRequest, ReleaseInfo};

/// Helm status of a healthy release
pub const RELEASE_DEPLOYED: &str = "deployed";

/// Release executor plus in-cluster primitives
#[async_trait]
pub trait DeploymentGateway: Send + Sync {
    /// Fail with `MissingTool` if a required binary is unavailable
    async fn preflight(&self) -> Result<()>;

    /// Install or upgrade a release
    async fn install(&self, req: &InstallRequest) -> Result<()>;

    /// Uninstall a release; one that does not exist is success
    async fn uninstall(&self, release: &str, namespace: &str) -> Result<()>;

    /// Status of a release, `None` when it does not exist
    async fn release_status(&self, release: &str, namespace: &str) -> Result<Option<String>>;

    /// Whether a release exists in a deployed state
    async fn exists(&self, release: &str, namespace: &str) -> Result<bool> {
        Ok(self.release_status(release, namespace).await?.as_deref() == Some(RELEASE_DEPLOYED))
    }

    /// All releases across namespaces
    async fn list_releases(&self) -> Result<Vec<ReleaseInfo>>;

    /// Create a namespace; one that already exists is success
    async fn create_namespace(&self, name: &str) -> Result<()>;

    /// Request namespace deletion; a missing namespace is success
    async fn delete_namespace(&self, name: &str) -> Result<()>;

    /// Whether a namespace still exists
    async fn namespace_exists(&self, name: &str) -> Result<bool>;

    /// Create or replace an Opaque secret
    async fn apply_secret(
        &self,
        namespace: &str,
        name: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Pods of a namespace
    async fn pod_states(&self, namespace: &str) -> Result<Vec<PodState>>;

    /// Ready/total nodes
    async fn node_readiness(&self) -> Result<NodeReadiness>;
}

/// Helm for releases, kube-rs for everything else.
///
/// The kube client is built on first use because the kubeconfig only
/// exists once the cluster is up.
pub struct ClusterDeployer {
    runner: Arc<dyn CommandRunner>,
    kubeconfig: PathBuf,
    helm: Helm,
    inspector: OnceCell<ClusterInspector>,
}

impl ClusterDeployer {
    /// Create a deployer for the cluster behind `kubeconfig`
    pub fn new(runner: Arc<dyn CommandRunner>, kubeconfig: impl Into<PathBuf>) -> Self {
        let kubeconfig = kubeconfig.into();
        Self {
            helm: Helm::new(runner.clone(), kubeconfig.clone()),
            runner,
            kubeconfig,
            inspector: OnceCell::new(),
        }
    }

    async fn inspector(&self) -> Result<&ClusterInspector> {
        self.inspector
            .get_or_try_init(|| async {
                client_from_kubeconfig(&self.kubeconfig)
                    .await
                    .map(ClusterInspector::new)
            })
            .await
    }
}

#[async_trait]
impl DeploymentGateway for ClusterDeployer {
    async fn preflight(&self) -> Result<()> {
        require_tools(self.runner.as_ref(), &["helm"]).await
    }

    async fn install(&self, req: &InstallRequest) -> Result<()> {
        self.helm.install(req).await
    }

    async fn uninstall(&self, release: &str, namespace: &str) -> Result<()> {
        self.helm.uninstall(release, namespace).await
    }

    async fn release_status(&self, release: &str, namespace: &str) -> Result<Option<String>> {
        self.helm.status(release, namespace).await
    }

    async fn list_releases(&self) -> Result<Vec<ReleaseInfo>> {
        self.helm.list(None).await
    }

    async fn create_namespace(&self, name: &str) -> Result<()> {
        self.inspector().await?.create_namespace(name).await
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        self.inspector().await?.delete_namespace(name).await
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool> {
        self.inspector().await?.namespace_exists(name).await
    }

    async fn apply_secret(
        &self,
        namespace: &str,
        name: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.inspector()
            .await?
            .apply_secret(namespace, name, data)
            .await
    }

    async fn pod_states(&self, namespace: &str) -> Result<Vec<PodState>> {
        self.inspector().await?.pod_states(namespace).await
    }

    async fn node_readiness(&self) -> Result<NodeReadiness> {
        self.inspector().await?.node_readiness().await
    }
}
