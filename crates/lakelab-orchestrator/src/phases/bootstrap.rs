//! State backend and foundation provisioning

use tracing::{info, warn};

use lakelab_common::{LabState, Result};

use crate::orchestrator::{
    BootstrapOptions, BootstrapReport, ModulePlan, PhaseOrchestrator, MODULE_FOUNDATION,
    MODULE_STATE_BACKEND,
};

/// Plan what `apply` would do without changing anything
pub(crate) async fn plan(
    orch: &PhaseOrchestrator,
    state: &LabState,
    opts: &BootstrapOptions,
) -> Result<BootstrapReport> {
    let mut report = BootstrapReport::default();

    if !state.bootstrapped || opts.force {
        let summary = orch.provisioner.plan(&orch.state_backend_run()).await?;
        report.plans.push(ModulePlan {
            module: MODULE_STATE_BACKEND.to_string(),
            summary,
        });
    }

    if !opts.skip_foundation && (!state.foundation_deployed || opts.force) {
        if state.bootstrapped {
            let summary = orch.provisioner.plan(&orch.foundation_run(state)?).await?;
            report.plans.push(ModulePlan {
                module: MODULE_FOUNDATION.to_string(),
                summary,
            });
        } else {
            let msg = "foundation plan needs the state backend; it will be planned after bootstrap";
            warn!("{}", msg);
            report.warnings.push(msg.to_string());
        }
    }

    info!(lab = %orch.config.lab, plans = report.plans.len(), "dry run complete, nothing applied");
    Ok(report)
}

/// Apply the state backend and foundation, checkpointing after each
pub(crate) async fn apply(
    orch: &PhaseOrchestrator,
    state: &mut LabState,
    opts: &BootstrapOptions,
) -> Result<BootstrapReport> {
    let mut report = BootstrapReport::default();

    if !state.bootstrapped || opts.force {
        info!(lab = %orch.config.lab, "[Phase 1] Provisioning state backend...");
        let outputs = orch.provisioner.apply(&orch.state_backend_run()).await?;
        state.mark_bootstrapped(outputs);
        orch.checkpoint(state, MODULE_STATE_BACKEND)?;
        report.applied.push(MODULE_STATE_BACKEND.to_string());
    }

    if opts.skip_foundation {
        info!(lab = %orch.config.lab, "skipping foundation");
        return Ok(report);
    }

    if !state.foundation_deployed || opts.force {
        info!(lab = %orch.config.lab, "[Phase 2] Provisioning foundation (network, database, object storage)...");
        let outputs = orch.provisioner.apply(&orch.foundation_run(state)?).await?;
        state.mark_foundation(outputs);
        orch.checkpoint(state, MODULE_FOUNDATION)?;
        report.applied.push(MODULE_FOUNDATION.to_string());
    }

    info!(lab = %orch.config.lab, phase = %state.phase(), "bootstrap complete");
    Ok(report)
}
