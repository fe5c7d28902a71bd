//! Component deployment in dependency batches
//!
//! Components in one batch are deployed concurrently and every branch runs
//! to completion before the batch is checkpointed. A failed component on the
//! dependency spine ([`FailurePolicy::Abort`]) stops `up` after that
//! checkpoint; a failed add-on is recorded and the remaining batches run.

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use lakelab_common::graph::DeployPlan;
use lakelab_common::{
    ComponentRecord, ComponentSpec, Error, FailurePolicy, LabState, PollResult, Result,
};
use lakelab_gateway::InstallRequest;

use crate::orchestrator::{PhaseOrchestrator, UpReport};

/// Deploy the plan batch by batch
pub(crate) async fn deploy(
    orch: &PhaseOrchestrator,
    state: &mut LabState,
    plan: &DeployPlan,
    force: bool,
    report: &mut UpReport,
) -> Result<()> {
    let mut failed: Vec<String> = Vec::new();

    for (index, batch) in plan.batches.iter().enumerate() {
        let mut pending: Vec<&ComponentSpec> = Vec::new();
        for name in batch {
            let spec = orch
                .resolver
                .spec(name)
                .ok_or_else(|| Error::UnknownComponent { name: name.clone() })?;
            if needs_deploy(orch, state, spec, force).await {
                pending.push(spec);
            } else {
                report.skipped.push(name.clone());
            }
        }
        if pending.is_empty() {
            debug!(batch = index + 1, "batch already deployed");
            continue;
        }

        let names: Vec<&str> = pending.iter().map(|s| s.name.as_str()).collect();
        info!(batch = index + 1, components = ?names, "[Phase 5] Deploying components...");

        let results = join_all(pending.iter().map(|spec| deploy_one(orch, spec))).await;

        let mut abort: Option<Error> = None;
        for (spec, result) in pending.iter().zip(results) {
            match result {
                Ok(()) => {
                    info!(component = %spec.name, namespace = %spec.namespace, "component deployed");
                    state.components.insert(
                        spec.name.clone(),
                        ComponentRecord::deployed(&spec.namespace, spec.release_name()),
                    );
                    report.deployed.push(spec.name.clone());
                }
                Err(e) => {
                    state.components.insert(
                        spec.name.clone(),
                        ComponentRecord::failed(&spec.namespace, spec.release_name()),
                    );
                    let policy = orch.resolver.failure_policy(&spec.name);
                    let cancelled = matches!(e, Error::Cancelled { .. });
                    if policy == FailurePolicy::Abort || cancelled {
                        error!(component = %spec.name, error = %e, "component failed, aborting");
                        abort.get_or_insert(e);
                    } else {
                        warn!(component = %spec.name, error = %e, "optional component failed, continuing");
                        report.warnings.push(format!("{}: {}", spec.name, e));
                        failed.push(spec.name.clone());
                    }
                }
            }
        }

        orch.checkpoint(state, &format!("components batch {}", index + 1))?;
        if let Some(e) = abort {
            return Err(e);
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(Error::ComponentsFailed { failed })
    }
}

/// Recorded deployed and the release still exists means nothing to do
async fn needs_deploy(
    orch: &PhaseOrchestrator,
    state: &LabState,
    spec: &ComponentSpec,
    force: bool,
) -> bool {
    if force || !state.is_deployed(&spec.name) {
        return true;
    }
    match orch.deployer.exists(spec.release_name(), &spec.namespace).await {
        Ok(true) => {
            debug!(component = %spec.name, "already deployed");
            false
        }
        Ok(false) => {
            warn!(component = %spec.name, "recorded as deployed but release is missing, redeploying");
            true
        }
        Err(e) => {
            warn!(component = %spec.name, error = %e, "could not verify release, redeploying");
            true
        }
    }
}

/// Install a release and wait for its pods
async fn deploy_one(orch: &PhaseOrchestrator, spec: &ComponentSpec) -> Result<()> {
    orch.deployer
        .install(&InstallRequest {
            release: spec.release_name().to_string(),
            chart: spec.chart.clone(),
            namespace: spec.namespace.clone(),
            version: spec.version.clone(),
            values_file: spec.values_file.clone(),
            wait: true,
            timeout: orch.config.timeouts.install(),
        })
        .await?;

    let deployer = orch.deployer.clone();
    let namespace = spec.namespace.clone();
    orch.poller
        .with_timeout(orch.config.timeouts.component_ready())
        .poll_until(&format!("pods of {} in {}", spec.name, spec.namespace), || {
            let deployer = deployer.clone();
            let namespace = namespace.clone();
            async move {
                PollResult::transient(deployer.pod_states(&namespace).await, |pods| {
                    let healthy = pods.iter().filter(|p| p.is_healthy()).count();
                    if !pods.is_empty() && healthy == pods.len() {
                        PollResult::Ready
                    } else {
                        PollResult::NotReady(format!("{}/{} pods ready", healthy, pods.len()))
                    }
                })
            }
        })
        .await
}
