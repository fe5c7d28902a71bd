//! The lab lifecycle state machine
//!
//! [`PhaseOrchestrator`] drives `bootstrap`, `up`, `down`, and `status`.
//! Every command starts by loading [`LabState`] from the store and saves it
//! after each durable step, so an interrupted command can be re-run and
//! resumes from the last checkpoint.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use lakelab_common::graph::{Batch, DeployPlan};
use lakelab_common::{
    DependencyResolver, Error, LabConfig, LabState, ReadinessPoller, Result, StateStore,
    OUTPUT_CLUSTER_NAME,
};
use lakelab_gateway::{BackendConfig, DeploymentGateway, ModuleRun, PlanSummary, ProvisionerGateway};

use crate::confirm::Confirmer;
use crate::phases;

/// Module holding the provisioner state bucket and lock table
pub const MODULE_STATE_BACKEND: &str = "state-backend";
/// Module holding network, database, object storage, and policies
pub const MODULE_FOUNDATION: &str = "foundation";
/// Module holding the compute cluster
pub const MODULE_CLUSTER: &str = "cluster";

/// Flags of `lakelab bootstrap`
#[derive(Clone, Debug, Default)]
pub struct BootstrapOptions {
    /// Plan only
    pub dry_run: bool,
    /// Stop after the state backend
    pub skip_foundation: bool,
    /// Re-apply even if already recorded
    pub force: bool,
}

/// Flags of `lakelab up`
#[derive(Clone, Debug, Default)]
pub struct UpOptions {
    /// Components named on the command line
    pub components: Vec<String>,
    /// Deploy every catalog component
    pub all: bool,
    /// Plan only
    pub dry_run: bool,
    /// Re-apply every step
    pub force: bool,
    /// Do not install essentials
    pub skip_essentials: bool,
    /// Stop after essentials
    pub skip_components: bool,
}

/// Flags of `lakelab down`
#[derive(Clone, Debug, Default)]
pub struct DownOptions {
    /// Skip the yes/no confirmation
    pub force: bool,
    /// Also destroy the foundation and state backend
    pub destroy_foundation: bool,
}

/// Plan of one module
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModulePlan {
    /// Module name
    pub module: String,
    /// Changes the provisioner would make
    pub summary: PlanSummary,
}

/// Outcome of `bootstrap`
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapReport {
    /// Nothing needed doing
    pub noop: bool,
    /// Dry-run plans
    pub plans: Vec<ModulePlan>,
    /// Modules applied
    pub applied: Vec<String>,
    /// Non-fatal problems
    pub warnings: Vec<String>,
}

/// Outcome of `up`
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpReport {
    /// Dry-run plans
    pub plans: Vec<ModulePlan>,
    /// Component batches in deployment order
    pub batches: Vec<Batch>,
    /// Modules applied
    pub applied: Vec<String>,
    /// Components installed by this run
    pub deployed: Vec<String>,
    /// Components already deployed and left alone
    pub skipped: Vec<String>,
    /// Non-fatal problems, including missing soft dependencies
    pub warnings: Vec<String>,
}

/// Outcome of `down`
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownReport {
    /// Operator declined the confirmation
    pub aborted: bool,
    /// Components uninstalled
    pub uninstalled: Vec<String>,
    /// Cluster destroyed by this run
    pub cluster_destroyed: bool,
    /// Foundation and state backend destroyed by this run
    pub foundation_destroyed: bool,
    /// Non-fatal problems
    pub warnings: Vec<String>,
}

/// Drives lab lifecycle transitions
pub struct PhaseOrchestrator {
    pub(crate) config: LabConfig,
    pub(crate) store: StateStore,
    pub(crate) provisioner: Arc<dyn ProvisionerGateway>,
    pub(crate) deployer: Arc<dyn DeploymentGateway>,
    pub(crate) confirmer: Arc<dyn Confirmer>,
    pub(crate) resolver: DependencyResolver,
    pub(crate) poller: ReadinessPoller,
}

impl PhaseOrchestrator {
    /// Create an orchestrator for the lab described by `config`
    pub fn new(
        config: LabConfig,
        provisioner: Arc<dyn ProvisionerGateway>,
        deployer: Arc<dyn DeploymentGateway>,
        confirmer: Arc<dyn Confirmer>,
    ) -> Result<Self> {
        let store = StateStore::new(config.state_dir()?);
        let resolver = config.resolver()?;
        let poller = ReadinessPoller::new(
            config.timeouts.poll_interval(),
            config.timeouts.cluster_active(),
        );
        Ok(Self {
            config,
            store,
            provisioner,
            deployer,
            confirmer,
            resolver,
            poller,
        })
    }

    /// Stop in-progress waits when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.poller = self.poller.with_cancellation(cancel);
        self
    }

    /// Lab configuration
    pub fn config(&self) -> &LabConfig {
        &self.config
    }

    /// Component graph
    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    /// Current persisted state
    pub fn load_state(&self) -> Result<LabState> {
        self.store.load(&self.config.lab)
    }

    /// Provision the state backend, then the foundation.
    ///
    /// Each sub-stage is checkpointed on success. Re-running after both are
    /// recorded is a no-op unless forced.
    pub async fn bootstrap(&self, opts: &BootstrapOptions) -> Result<BootstrapReport> {
        let mut state = self.load_state()?;
        let foundation_done = state.foundation_deployed || opts.skip_foundation;
        if state.bootstrapped && foundation_done && !opts.force {
            info!(lab = %self.config.lab, phase = %state.phase(), "already bootstrapped, nothing to do");
            return Ok(BootstrapReport {
                noop: true,
                ..Default::default()
            });
        }

        self.provisioner.preflight().await?;

        if opts.dry_run {
            return phases::bootstrap::plan(self, &state, opts).await;
        }
        phases::bootstrap::apply(self, &mut state, opts).await
    }

    /// Bring the cluster, essentials, and requested components up.
    ///
    /// The component request is validated against the graph before any
    /// external call, so an unmet hard dependency has no side effects.
    pub async fn up(&self, opts: &UpOptions) -> Result<UpReport> {
        if opts.skip_components && (opts.all || !opts.components.is_empty()) {
            return Err(Error::validation(
                "--skip-components cannot be combined with component names or --all",
            ));
        }

        let mut state = self.load_state()?;
        if !state.foundation_deployed {
            return Err(Error::phase_not_ready(
                "foundation",
                "run `lakelab bootstrap` first",
            ));
        }

        let requested = self.requested_components(opts);
        let deployed: BTreeSet<String> = state.deployed_components().into_iter().collect();
        let plan = if requested.is_empty() {
            DeployPlan::default()
        } else {
            self.resolver.resolve(&requested, &deployed)?
        };

        let mut report = UpReport {
            batches: plan.batches.clone(),
            ..Default::default()
        };
        for w in &plan.warnings {
            let msg = format!(
                "{} has soft dependency '{}' which is neither deployed nor requested",
                w.component, w.missing
            );
            warn!(component = %w.component, missing = %w.missing, "soft dependency missing");
            report.warnings.push(msg);
        }

        self.provisioner.preflight().await?;
        self.deployer.preflight().await?;
        self.recover_foundation_outputs(&mut state, opts.dry_run, &mut report)
            .await?;

        if opts.dry_run {
            if !state.cluster_deployed || opts.force {
                let summary = self.provisioner.plan(&self.cluster_run(&state)?).await?;
                report.plans.push(ModulePlan {
                    module: MODULE_CLUSTER.to_string(),
                    summary,
                });
            }
            info!(lab = %self.config.lab, batches = report.batches.len(), "dry run complete, nothing applied");
            return Ok(report);
        }

        phases::cluster::provision(self, &mut state, opts.force, &mut report).await?;
        phases::cluster::await_ready(self, &mut state, opts.force).await?;

        if !opts.skip_essentials && (!state.essentials_deployed || opts.force) {
            phases::essentials::install(self, &mut state, &mut report).await?;
        }

        if plan.batches.is_empty() {
            info!(lab = %self.config.lab, phase = %state.phase(), "up complete");
            return Ok(report);
        }
        if !state.essentials_deployed {
            return Err(Error::phase_not_ready(
                "essentials",
                "run `lakelab up` without --skip-essentials before deploying components",
            ));
        }

        phases::components::deploy(self, &mut state, &plan, opts.force, &mut report).await?;
        info!(lab = %self.config.lab, phase = %state.phase(), "up complete");
        Ok(report)
    }

    /// Tear the ephemeral layer down, optionally the foundation too
    pub async fn down(&self, opts: &DownOptions) -> Result<DownReport> {
        let mut state = self.load_state()?;

        if opts.destroy_foundation {
            let prompt = format!(
                "This destroys the cluster, database, object storage, and state backend of lab '{}'. Type the lab name to confirm",
                self.config.lab
            );
            if !self.confirmer.confirm_typed(&prompt, &self.config.lab)? {
                return Err(Error::Confirmation {
                    message: format!("typed name did not match '{}'", self.config.lab),
                });
            }
        } else if !opts.force {
            let prompt = format!(
                "Destroy the cluster and all components of lab '{}'?",
                self.config.lab
            );
            if !self.confirmer.confirm(&prompt)? {
                info!(lab = %self.config.lab, "teardown aborted by operator");
                return Ok(DownReport {
                    aborted: true,
                    ..Default::default()
                });
            }
        }

        let mut report = DownReport::default();
        let foundation_work = opts.destroy_foundation && state.bootstrapped;
        if !state.cluster_deployed && !foundation_work {
            info!(lab = %self.config.lab, phase = %state.phase(), "no cluster recorded, nothing to tear down");
            return Ok(report);
        }

        self.provisioner.preflight().await?;
        if state.cluster_deployed {
            self.deployer.preflight().await?;
            phases::teardown::ephemeral(self, &mut state, &mut report).await?;
            if !opts.destroy_foundation {
                phases::teardown::verify_foundation(self, &state, &mut report).await;
            }
        }

        if opts.destroy_foundation {
            phases::teardown::foundation(self, &mut state, &mut report).await?;
        }
        Ok(report)
    }

    pub(crate) fn requested_components(&self, opts: &UpOptions) -> BTreeSet<String> {
        if opts.skip_components {
            return BTreeSet::new();
        }
        let mut requested: BTreeSet<String> = opts.components.iter().cloned().collect();
        if opts.all {
            requested.extend(self.resolver.names());
        } else if requested.is_empty() {
            requested = self.resolver.default_set();
        }
        requested
    }

    /// Save and log a durable step
    pub(crate) fn checkpoint(&self, state: &mut LabState, step: &str) -> Result<()> {
        self.store.save(state)?;
        info!(lab = %self.config.lab, step, phase = %state.phase(), "checkpoint saved");
        Ok(())
    }

    fn base_vars(&self) -> BTreeMap<String, serde_json::Value> {
        let mut vars = BTreeMap::new();
        vars.insert("lab_name".to_string(), serde_json::json!(self.config.lab));
        vars.insert("region".to_string(), serde_json::json!(self.config.region));
        vars
    }

    fn with_config_vars(
        &self,
        mut vars: BTreeMap<String, serde_json::Value>,
    ) -> BTreeMap<String, serde_json::Value> {
        vars.extend(self.config.variables.clone());
        vars
    }

    /// Re-read foundation outputs when the record has none, so the cluster
    /// module still gets its inputs.
    async fn recover_foundation_outputs(
        &self,
        state: &mut LabState,
        dry_run: bool,
        report: &mut UpReport,
    ) -> Result<()> {
        if !state.outputs.foundation.is_empty() {
            return Ok(());
        }
        info!(lab = %self.config.lab, "foundation outputs missing from state, reading them back");
        let outputs = self.provisioner.output(&self.foundation_run(state)?).await?;
        if outputs.is_empty() {
            let msg = "foundation module reported no outputs".to_string();
            warn!("{}", msg);
            report.warnings.push(msg);
            return Ok(());
        }
        state.outputs.foundation = outputs;
        if !dry_run {
            self.checkpoint(state, "foundation outputs")?;
        }
        Ok(())
    }

    pub(crate) fn state_backend_run(&self) -> ModuleRun {
        ModuleRun {
            name: MODULE_STATE_BACKEND.to_string(),
            dir: self.config.modules.state_backend.clone(),
            vars: self.with_config_vars(self.base_vars()),
            backend: None,
        }
    }

    pub(crate) fn foundation_run(&self, state: &LabState) -> Result<ModuleRun> {
        Ok(ModuleRun {
            name: MODULE_FOUNDATION.to_string(),
            dir: self.config.modules.foundation.clone(),
            vars: self.with_config_vars(self.base_vars()),
            backend: Some(self.backend_for(MODULE_FOUNDATION, state)?),
        })
    }

    /// Cluster module inputs include the foundation outputs (network ids, endpoints)
    pub(crate) fn cluster_run(&self, state: &LabState) -> Result<ModuleRun> {
        let mut vars = self.base_vars();
        for (key, value) in &state.outputs.foundation {
            vars.insert(key.clone(), serde_json::json!(value));
        }
        Ok(ModuleRun {
            name: MODULE_CLUSTER.to_string(),
            dir: self.config.modules.cluster.clone(),
            vars: self.with_config_vars(vars),
            backend: Some(self.backend_for(MODULE_CLUSTER, state)?),
        })
    }

    fn backend_for(&self, module: &str, state: &LabState) -> Result<BackendConfig> {
        BackendConfig::for_module(
            &self.config.lab,
            module,
            &self.config.region,
            &state.outputs.bootstrap,
        )
    }

    pub(crate) fn cluster_name(&self, state: &LabState) -> Result<String> {
        state
            .outputs
            .cluster
            .get(OUTPUT_CLUSTER_NAME)
            .cloned()
            .ok_or_else(|| {
                Error::phase_not_ready(
                    "cluster",
                    format!(
                        "cluster output '{}' is missing; run `lakelab up --force`",
                        OUTPUT_CLUSTER_NAME
                    ),
                )
            })
    }
}
