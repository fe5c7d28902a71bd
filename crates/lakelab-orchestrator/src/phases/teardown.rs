//! Teardown of the ephemeral layer and, on request, the foundation
//!
//! Component uninstalls, namespace deletion, and post-teardown verification
//! are best-effort: failures become warnings. Provisioner destroys are hard.

use std::collections::BTreeSet;

use futures::future::join_all;
use tracing::{info, warn};

use lakelab_common::{
    Error, LabState, PollResult, Result, OUTPUT_BUCKET_NAME, OUTPUT_DB_INSTANCE_ID,
};
use lakelab_gateway::DatabaseStatus;

use crate::orchestrator::{
    DownReport, PhaseOrchestrator, MODULE_CLUSTER, MODULE_FOUNDATION,
};

/// Uninstall components, drain namespaces, destroy the cluster
pub(crate) async fn ephemeral(
    orch: &PhaseOrchestrator,
    state: &mut LabState,
    report: &mut DownReport,
) -> Result<()> {
    if state.cluster_ready {
        ensure_kubeconfig(orch, state, report).await;
        undeploy_components(orch, state, report).await?;
        drain_namespaces(orch, state, report).await?;
    }

    info!(lab = %orch.config.lab, "[Phase 3] Destroying cluster...");
    orch.provisioner.destroy(&orch.cluster_run(state)?).await?;
    state.clear_ephemeral();
    orch.checkpoint(state, MODULE_CLUSTER)?;
    report.cluster_destroyed = true;

    if let Ok(path) = orch.config.kubeconfig_path() {
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "failed to remove kubeconfig");
            }
        }
    }
    Ok(())
}

async fn ensure_kubeconfig(orch: &PhaseOrchestrator, state: &LabState, report: &mut DownReport) {
    let Ok(path) = orch.config.kubeconfig_path() else {
        return;
    };
    if path.exists() {
        return;
    }
    let result = match orch.cluster_name(state) {
        Ok(cluster) => orch.provisioner.write_kubeconfig(&cluster, &path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        let msg = format!("could not configure cluster access: {}", e);
        warn!("{}", msg);
        report.warnings.push(msg);
    }
}

/// Leaves first; every component of a batch is attempted even if a sibling fails.
/// A component stays installed while anything that hard-depends on it does.
async fn undeploy_components(
    orch: &PhaseOrchestrator,
    state: &mut LabState,
    report: &mut DownReport,
) -> Result<()> {
    let recorded: BTreeSet<String> = state.components.keys().cloned().collect();
    if recorded.is_empty() {
        return Ok(());
    }

    info!(lab = %orch.config.lab, components = recorded.len(), "[Phase 1] Undeploying components...");
    let mut retained: BTreeSet<String> = BTreeSet::new();
    for batch in orch.resolver.undeploy_order(&recorded) {
        let mut targets: Vec<(String, String, String)> = Vec::new();
        for name in &batch {
            let Some(record) = state.components.get(name) else {
                continue;
            };
            if let Some(dependent) = retained_dependent(orch, &retained, name) {
                let msg = format!(
                    "skipped uninstall of {}: {} still installed, cluster destroy will remove it",
                    name, dependent
                );
                warn!(component = %name, dependent = %dependent, "dependent still installed, skipping uninstall");
                report.warnings.push(msg);
                retained.insert(name.clone());
                continue;
            }
            targets.push((name.clone(), record.release_name.clone(), record.namespace.clone()));
        }

        let results = join_all(
            targets
                .iter()
                .map(|(_, release, ns)| orch.deployer.uninstall(release, ns)),
        )
        .await;

        for ((name, _, _), result) in targets.iter().zip(results) {
            match result {
                Ok(()) => {
                    state.components.remove(name);
                    report.uninstalled.push(name.clone());
                }
                Err(e) => {
                    let msg = format!("failed to uninstall {}: {}", name, e);
                    warn!(component = %name, error = %e, "uninstall failed, cluster destroy will remove it");
                    report.warnings.push(msg);
                    retained.insert(name.clone());
                }
            }
        }
        orch.checkpoint(state, "components removed")?;
    }
    Ok(())
}

/// First still-installed component that hard-depends on `name`
fn retained_dependent<'a>(
    orch: &PhaseOrchestrator,
    retained: &'a BTreeSet<String>,
    name: &str,
) -> Option<&'a String> {
    retained.iter().find(|r| {
        orch.resolver
            .spec(r)
            .is_some_and(|spec| spec.hard_dependencies.contains(name))
    })
}

/// Best-effort namespace deletion, then a bounded wait for them to disappear
async fn drain_namespaces(
    orch: &PhaseOrchestrator,
    state: &LabState,
    report: &mut DownReport,
) -> Result<()> {
    let occupied: BTreeSet<String> = state.components.values().map(|r| r.namespace.clone()).collect();
    let namespaces: BTreeSet<String> = orch
        .resolver
        .specs()
        .map(|s| s.namespace.clone())
        .filter(|ns| !occupied.contains(ns))
        .collect();
    if !occupied.is_empty() {
        info!(namespaces = ?occupied, "keeping namespaces of components still installed");
    }

    info!(namespaces = namespaces.len(), "[Phase 2] Deleting component namespaces...");
    for ns in &namespaces {
        if let Err(e) = orch.deployer.delete_namespace(ns).await {
            warn!(namespace = %ns, error = %e, "namespace delete failed");
            report.warnings.push(format!("failed to delete namespace {}: {}", ns, e));
        }
    }

    let deployer = orch.deployer.clone();
    let wait = orch
        .poller
        .with_timeout(orch.config.timeouts.namespace_drain())
        .poll_until("namespace drain", || {
            let deployer = deployer.clone();
            let namespaces = namespaces.clone();
            async move {
                let mut remaining = Vec::new();
                for ns in &namespaces {
                    match deployer.namespace_exists(ns).await {
                        Ok(false) => {}
                        Ok(true) | Err(_) => remaining.push(ns.clone()),
                    }
                }
                if remaining.is_empty() {
                    PollResult::Ready
                } else {
                    PollResult::NotReady(format!("terminating: {}", remaining.join(", ")))
                }
            }
        })
        .await;

    match wait {
        Ok(()) => Ok(()),
        Err(e @ Error::Cancelled { .. }) => Err(e),
        Err(e) => {
            warn!(error = %e, "namespaces still draining, continuing with cluster destroy");
            report.warnings.push(e.to_string());
            Ok(())
        }
    }
}

/// Check that the foundation survived the teardown; warnings only
pub(crate) async fn verify_foundation(
    orch: &PhaseOrchestrator,
    state: &LabState,
    report: &mut DownReport,
) {
    info!(lab = %orch.config.lab, "[Phase 4] Verifying foundation...");
    let mut warn_with = |msg: String| {
        warn!("{}", msg);
        report.warnings.push(msg);
    };

    match state.outputs.foundation.get(OUTPUT_BUCKET_NAME) {
        Some(bucket) => match orch.provisioner.object_store_exists(bucket).await {
            Ok(true) => info!(bucket = %bucket, "object store intact"),
            Ok(false) => warn_with(format!("object store {} not found after teardown", bucket)),
            Err(e) => warn_with(format!("could not verify object store {}: {}", bucket, e)),
        },
        None => warn_with(format!("foundation output '{}' missing, object store not verified", OUTPUT_BUCKET_NAME)),
    }

    match state.outputs.foundation.get(OUTPUT_DB_INSTANCE_ID) {
        Some(id) => match orch.provisioner.database_status(id).await {
            Ok(Some(DatabaseStatus::Available)) => info!(database = %id, "database intact"),
            Ok(Some(status)) => warn_with(format!("database {} is {}", id, status)),
            Ok(None) => warn_with(format!("database {} not found after teardown", id)),
            Err(e) => warn_with(format!("could not verify database {}: {}", id, e)),
        },
        None => warn_with(format!("foundation output '{}' missing, database not verified", OUTPUT_DB_INSTANCE_ID)),
    }
}

/// Destroy foundation then state backend, and reset the record
pub(crate) async fn foundation(
    orch: &PhaseOrchestrator,
    state: &mut LabState,
    report: &mut DownReport,
) -> Result<()> {
    if state.foundation_deployed {
        info!(lab = %orch.config.lab, "[Phase 5] Destroying foundation...");
        orch.provisioner.destroy(&orch.foundation_run(state)?).await?;
        state.clear_foundation();
        orch.checkpoint(state, MODULE_FOUNDATION)?;
    }

    if state.bootstrapped {
        info!(lab = %orch.config.lab, "[Phase 6] Destroying state backend...");
        orch.provisioner.destroy(&orch.state_backend_run()).await?;
    }

    state.reset();
    orch.checkpoint(state, "reset")?;
    report.foundation_destroyed = true;
    info!(lab = %orch.config.lab, "lab fully destroyed");
    Ok(())
}
