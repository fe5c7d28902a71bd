//! Read-only lab status

use serde::Serialize;
use tracing::{debug, warn};

use lakelab_common::{FailurePolicy, LabState, Result};
use lakelab_gateway::ReleaseInfo;

use crate::orchestrator::PhaseOrchestrator;

/// Deployment state of one component
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentState {
    /// Recorded as deployed
    Deployed,
    /// Last attempt failed
    Failed,
    /// Never attempted or removed
    NotDeployed,
}

impl std::fmt::Display for ComponentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deployed => write!(f, "deployed"),
            Self::Failed => write!(f, "failed"),
            Self::NotDeployed => write!(f, "not deployed"),
        }
    }
}

/// One row of the component table
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// Component name
    pub name: String,
    /// Target namespace
    pub namespace: String,
    /// Release name
    pub release: String,
    /// Recorded deployment state
    pub state: ComponentState,
    /// Failure handling during `up`; `None` for components missing from the catalog
    pub policy: Option<FailurePolicy>,
    /// Required predecessors
    pub hard_dependencies: Vec<String>,
    /// Optional predecessors
    pub soft_dependencies: Vec<String>,
    /// Deployed by a bare `up`
    pub default: bool,
    /// Release status reported by the cluster; `None` when not listed
    pub live_status: Option<String>,
}

/// Snapshot returned by `status`
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Macro phase derived from the flags
    pub phase: String,
    /// Region from configuration
    pub region: String,
    /// Live control-plane status, when a cluster is recorded
    pub cluster_status: Option<String>,
    /// Catalog components plus any recorded ones the catalog no longer knows
    pub components: Vec<ComponentStatus>,
    /// Releases installed in the cluster, when it is reachable
    pub releases: Vec<ReleaseInfo>,
    /// The persisted record as loaded
    pub state: LabState,
    /// Problems reaching live resources
    pub warnings: Vec<String>,
}

impl PhaseOrchestrator {
    /// Report the persisted record and, if a cluster is recorded, its live
    /// status and releases. Never writes state.
    pub async fn status(&self) -> Result<StatusReport> {
        let state = self.load_state()?;
        let mut warnings = Vec::new();

        let mut cluster_status = None;
        if state.cluster_deployed {
            match self.cluster_name(&state) {
                Ok(cluster) => match self.provisioner.cluster_status(&cluster).await {
                    Ok(status) => cluster_status = Some(status.to_string()),
                    Err(e) => {
                        warn!(cluster = %cluster, error = %e, "could not query cluster status");
                        warnings.push(format!("could not query cluster {}: {}", cluster, e));
                    }
                },
                Err(e) => warnings.push(e.to_string()),
            }
        }

        let mut releases = Vec::new();
        if state.cluster_ready {
            match self.deployer.list_releases().await {
                Ok(listed) => releases = listed,
                Err(e) => {
                    warn!(error = %e, "could not list releases");
                    warnings.push(format!("could not list releases: {}", e));
                }
            }
        }

        let mut components = self.component_rows(&state);
        for row in &mut components {
            row.live_status = releases
                .iter()
                .find(|r| r.name == row.release && r.namespace == row.namespace)
                .map(|r| r.status.clone());
        }
        if state.cluster_ready && !releases.is_empty() {
            for row in &components {
                if row.state == ComponentState::Deployed && row.live_status.is_none() {
                    warnings.push(format!(
                        "{} is recorded as deployed but release {} is not installed",
                        row.name, row.release
                    ));
                }
            }
        }
        debug!(lab = %self.config.lab, components = components.len(), "status collected");

        Ok(StatusReport {
            phase: state.phase().to_string(),
            region: self.config.region.clone(),
            cluster_status,
            components,
            releases,
            state,
            warnings,
        })
    }

    fn component_rows(&self, state: &LabState) -> Vec<ComponentStatus> {
        let recorded_state = |name: &str| match state.components.get(name) {
            Some(record) if record.deployed => ComponentState::Deployed,
            Some(_) => ComponentState::Failed,
            None => ComponentState::NotDeployed,
        };

        let mut rows: Vec<ComponentStatus> = self
            .resolver
            .specs()
            .map(|spec| ComponentStatus {
                name: spec.name.clone(),
                namespace: spec.namespace.clone(),
                release: spec.release_name().to_string(),
                state: recorded_state(&spec.name),
                policy: Some(self.resolver.failure_policy(&spec.name)),
                hard_dependencies: spec.hard_dependencies.iter().cloned().collect(),
                soft_dependencies: spec.soft_dependencies.iter().cloned().collect(),
                default: spec.default,
                live_status: None,
            })
            .collect();

        for (name, record) in &state.components {
            if self.resolver.spec(name).is_none() {
                rows.push(ComponentStatus {
                    name: name.clone(),
                    namespace: record.namespace.clone(),
                    release: record.release_name.clone(),
                    state: recorded_state(name),
                    policy: None,
                    hard_dependencies: Vec::new(),
                    soft_dependencies: Vec::new(),
                    default: false,
                    live_status: None,
                });
            }
        }
        rows
    }
}
