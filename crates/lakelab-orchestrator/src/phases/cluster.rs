//! Cluster provisioning, readiness, and access

use tracing::{debug, info};

use lakelab_common::{Error, LabState, PollResult, Result};
use lakelab_gateway::ClusterStatus;

use crate::orchestrator::{PhaseOrchestrator, UpReport, MODULE_CLUSTER};

/// Apply the cluster module unless it is already recorded.
///
/// A forced re-apply keeps the readiness flags; the provisioner reconciles
/// the running cluster in place.
pub(crate) async fn provision(
    orch: &PhaseOrchestrator,
    state: &mut LabState,
    force: bool,
    report: &mut UpReport,
) -> Result<()> {
    if state.cluster_deployed && !force {
        debug!(lab = %orch.config.lab, "cluster already provisioned");
        return Ok(());
    }

    info!(lab = %orch.config.lab, "[Phase 1] Provisioning cluster...");
    let outputs = orch.provisioner.apply(&orch.cluster_run(state)?).await?;
    if state.cluster_deployed {
        state.outputs.cluster = outputs;
    } else {
        state.mark_cluster_deployed(outputs);
    }
    orch.checkpoint(state, MODULE_CLUSTER)?;
    report.applied.push(MODULE_CLUSTER.to_string());
    Ok(())
}

/// Wait for the control plane and nodes, then record the cluster ready.
///
/// Skipped when readiness is already recorded, but the kubeconfig is
/// rewritten if it has gone missing so later steps can reach the cluster.
pub(crate) async fn await_ready(orch: &PhaseOrchestrator, state: &mut LabState, force: bool) -> Result<()> {
    let cluster = orch.cluster_name(state)?;
    let kubeconfig = orch.config.kubeconfig_path()?;

    if state.cluster_ready && !force {
        if !kubeconfig.exists() {
            orch.provisioner.write_kubeconfig(&cluster, &kubeconfig).await?;
        }
        return Ok(());
    }

    info!(cluster = %cluster, "[Phase 2] Waiting for cluster to become active...");
    let provisioner = orch.provisioner.clone();
    orch.poller
        .with_timeout(orch.config.timeouts.cluster_active())
        .poll_until(&format!("cluster {}", cluster), || {
            let provisioner = provisioner.clone();
            let cluster = cluster.clone();
            async move { classify_cluster(&cluster, provisioner.cluster_status(&cluster).await) }
        })
        .await?;

    orch.provisioner.write_kubeconfig(&cluster, &kubeconfig).await?;

    info!(cluster = %cluster, "[Phase 3] Waiting for nodes to be ready...");
    let deployer = orch.deployer.clone();
    orch.poller
        .with_timeout(orch.config.timeouts.node_ready())
        .poll_until(&format!("nodes of {}", cluster), || {
            let deployer = deployer.clone();
            async move {
                PollResult::transient(deployer.node_readiness().await, |nodes| {
                    if nodes.all_ready() {
                        PollResult::Ready
                    } else {
                        PollResult::NotReady(format!("{}/{} nodes ready", nodes.ready, nodes.total))
                    }
                })
            }
        })
        .await?;

    state.mark_cluster_ready();
    orch.checkpoint(state, "cluster-ready")?;
    Ok(())
}

fn classify_cluster(cluster: &str, status: Result<ClusterStatus>) -> PollResult {
    PollResult::transient(status, |status| match status {
        ClusterStatus::Active => PollResult::Ready,
        s if s.is_terminal_failure() => PollResult::Fatal(Error::ReadinessFatal {
            what: format!("cluster {}", cluster),
            detail: s.to_string(),
        }),
        s => PollResult::NotReady(s.to_string()),
    })
}
