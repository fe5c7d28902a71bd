//! Namespaces, credential secret, and cluster-essential releases

use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, warn};

use lakelab_common::{LabState, Result};
use lakelab_gateway::InstallRequest;

use crate::orchestrator::{PhaseOrchestrator, UpReport};

/// Create every catalog namespace, inject the database credential, then
/// install the essentials. All steps are hard: any failure aborts `up`.
pub(crate) async fn install(
    orch: &PhaseOrchestrator,
    state: &mut LabState,
    report: &mut UpReport,
) -> Result<()> {
    info!(lab = %orch.config.lab, "[Phase 4] Installing cluster essentials...");

    let namespaces: BTreeSet<String> = orch
        .resolver
        .specs()
        .map(|spec| spec.namespace.clone())
        .collect();
    for ns in &namespaces {
        orch.deployer.create_namespace(ns).await?;
    }

    let secret = &orch.config.credential_secret;
    match state.outputs.foundation.get(&secret.output_key) {
        Some(reference) => {
            let data: BTreeMap<String, String> = orch.provisioner.read_secret(reference).await?;
            for ns in &namespaces {
                orch.deployer.apply_secret(ns, &secret.name, &data).await?;
            }
            info!(secret = %secret.name, namespaces = namespaces.len(), "credential secret injected");
        }
        None => {
            let msg = format!(
                "foundation output '{}' not found; skipping credential secret '{}'",
                secret.output_key, secret.name
            );
            warn!("{}", msg);
            report.warnings.push(msg);
        }
    }

    for essential in &orch.config.essentials {
        orch.deployer
            .install(&InstallRequest {
                release: essential.name.clone(),
                chart: essential.chart.clone(),
                namespace: essential.namespace.clone(),
                version: essential.version.clone(),
                values_file: essential.values_file.clone(),
                wait: true,
                timeout: orch.config.timeouts.install(),
            })
            .await?;
    }

    state.mark_essentials();
    orch.checkpoint(state, "essentials")?;
    Ok(())
}
