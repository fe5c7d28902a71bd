//! CLI commands

use std::path::Path;
use std::sync::Arc;

use clap::ValueEnum;
use tokio_util::sync::CancellationToken;

use lakelab_common::LabConfig;
use lakelab_gateway::{CloudProvisioner, ClusterDeployer, TokioCommandRunner};
use lakelab_orchestrator::PhaseOrchestrator;

use crate::Result;

pub mod bootstrap;
pub mod down;
pub mod format;
pub mod prompt;
pub mod status;
pub mod up;

/// Output format
#[derive(Clone, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    /// Columnar table (default)
    #[default]
    Table,
    /// JSON
    Json,
}

/// Load the lab config and wire the real gateways into an orchestrator
pub fn orchestrator(config: Option<&Path>, cancel: CancellationToken) -> Result<PhaseOrchestrator> {
    let config = LabConfig::load(config)?;
    let runner = Arc::new(TokioCommandRunner);
    let provisioner = Arc::new(CloudProvisioner::new(runner.clone(), config.region.clone()));
    let deployer = Arc::new(ClusterDeployer::new(runner, config.kubeconfig_path()?));
    let confirmer = Arc::new(prompt::TerminalConfirmer);

    let orch = PhaseOrchestrator::new(config, provisioner, deployer, confirmer)?;
    Ok(orch.with_cancellation(cancel))
}

/// Print a report as pretty JSON
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print warnings collected by a command
pub(crate) fn print_warnings(warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    println!();
    println!("Warnings:");
    for w in warnings {
        println!("  - {}", w);
    }
}
