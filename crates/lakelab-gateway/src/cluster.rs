//! Cluster inspection and namespace/secret primitives via kube-rs

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Namespace, Node, Pod, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use lakelab_common::{Error, Result};

const FIELD_MANAGER: &str = "lakelab";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Phase and readiness of one pod
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodState {
    /// Pod name
    pub name: String,
    /// Pod phase (Pending, Running, Succeeded, Failed, Unknown)
    pub phase: String,
    /// Every container reports ready
    pub ready: bool,
}

impl PodState {
    /// Running and ready, or a completed job pod
    pub fn is_healthy(&self) -> bool {
        (self.phase == "Running" && self.ready) || self.phase == "Succeeded"
    }
}

/// Ready/total node counts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeReadiness {
    /// Nodes with condition Ready=True
    pub ready: usize,
    /// All registered nodes
    pub total: usize,
}

impl NodeReadiness {
    /// At least one node and every node ready
    pub fn all_ready(&self) -> bool {
        self.total > 0 && self.ready == self.total
    }
}

/// Build a client from an explicit kubeconfig file
pub async fn client_from_kubeconfig(path: &Path) -> Result<Client> {
    let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
        Error::deployment_for("cluster", format!("failed to read kubeconfig {}: {}", path.display(), e))
    })?;
    let mut config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| Error::deployment_for("cluster", format!("failed to load kubeconfig: {}", e)))?;
    config.connect_timeout = Some(CONNECT_TIMEOUT);
    config.read_timeout = Some(READ_TIMEOUT);
    Client::try_from(config)
        .map_err(|e| Error::deployment_for("cluster", format!("failed to create client: {}", e)))
}

fn kube_err(what: impl Into<String>, e: kube::Error) -> Error {
    Error::deployment_for(what, e.to_string())
}

/// Namespace, secret, pod, and node operations against one cluster
#[derive(Clone)]
pub struct ClusterInspector {
    client: Client,
}

impl ClusterInspector {
    /// Wrap an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create a namespace; one that already exists is success
    pub async fn create_namespace(&self, name: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let ns = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {
                "name": name,
                "labels": { "app.kubernetes.io/managed-by": FIELD_MANAGER }
            }
        });
        api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(&ns))
            .await
            .map_err(|e| kube_err(name, e))?;
        debug!(namespace = %name, "namespace ensured");
        Ok(())
    }

    /// Request namespace deletion; a missing namespace is success
    pub async fn delete_namespace(&self, name: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(namespace = %name, "namespace deletion requested");
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(kube_err(name, e)),
        }
    }

    /// Whether a namespace still exists (including while terminating)
    pub async fn namespace_exists(&self, name: &str) -> Result<bool> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.get(name).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
            Err(e) => Err(kube_err(name, e)),
        }
    }

    /// Create or replace an Opaque secret
    pub async fn apply_secret(
        &self,
        namespace: &str,
        name: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<()> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let encoded: BTreeMap<String, ByteString> = data
            .iter()
            .map(|(k, v)| (k.clone(), ByteString(v.as_bytes().to_vec())))
            .collect();
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            type_: Some("Opaque".to_string()),
            data: Some(encoded),
            ..Default::default()
        };
        let mut secret = serde_json::to_value(&secret)?;
        secret["apiVersion"] = serde_json::json!("v1");
        secret["kind"] = serde_json::json!("Secret");
        api.patch(name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&secret))
            .await
            .map_err(|e| kube_err(format!("{}/{}", namespace, name), e))?;
        debug!(namespace = %namespace, secret = %name, "secret applied");
        Ok(())
    }

    /// Phase and readiness of every pod in a namespace
    pub async fn pod_states(&self, namespace: &str) -> Result<Vec<PodState>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api
            .list(&ListParams::default())
            .await
            .map_err(|e| kube_err(namespace, e))?;
        Ok(pods.items.iter().map(pod_state).collect())
    }

    /// Ready and total node counts
    pub async fn node_readiness(&self) -> Result<NodeReadiness> {
        let api: Api<Node> = Api::all(self.client.clone());
        let nodes = api
            .list(&ListParams::default())
            .await
            .map_err(|e| kube_err("nodes", e))?;
        let ready = nodes.items.iter().filter(|n| node_is_ready(n)).count();
        Ok(NodeReadiness {
            ready,
            total: nodes.items.len(),
        })
    }
}

fn pod_state(pod: &Pod) -> PodState {
    let status = pod.status.as_ref();
    let phase = status
        .and_then(|s| s.phase.clone())
        .unwrap_or_else(|| "Unknown".to_string());
    let ready = status
        .and_then(|s| s.container_statuses.as_ref())
        .map(|cs| !cs.is_empty() && cs.iter().all(|c| c.ready))
        .unwrap_or(false);
    PodState {
        name: pod.metadata.name.clone().unwrap_or_default(),
        phase,
        ready,
    }
}

fn node_is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| conds.iter().any(|c| c.type_ == "Ready" && c.status == "True"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ContainerStatus, NodeCondition, NodeStatus, PodStatus};

    fn pod(phase: &str, ready: &[bool]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("trino-coordinator-0".to_string()),
                ..Default::default()
            },
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                container_statuses: Some(
                    ready
                        .iter()
                        .map(|r| ContainerStatus {
                            ready: *r,
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn node(ready: &str) -> Node {
        Node {
            status: Some(NodeStatus {
                conditions: Some(vec![NodeCondition {
                    type_: "Ready".to_string(),
                    status: ready.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn running_pod_needs_all_containers_ready() {
        assert!(pod_state(&pod("Running", &[true, true])).is_healthy());
        assert!(!pod_state(&pod("Running", &[true, false])).is_healthy());
        assert!(!pod_state(&pod("Pending", &[])).is_healthy());
        assert!(pod_state(&pod("Succeeded", &[false])).is_healthy());
    }

    #[test]
    fn node_readiness_from_conditions() {
        assert!(node_is_ready(&node("True")));
        assert!(!node_is_ready(&node("Unknown")));
        assert!(!node_is_ready(&Node::default()));
    }

    #[test]
    fn zero_nodes_is_not_ready() {
        assert!(!NodeReadiness::default().all_ready());
        assert!(NodeReadiness { ready: 3, total: 3 }.all_ready());
        assert!(!NodeReadiness { ready: 2, total: 3 }.all_ready());
    }
}
