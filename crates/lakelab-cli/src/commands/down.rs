//! Down command - tear the lab down
//!
//! Usage: lakelab down [--force] [--destroy-foundation]
//!
//! Without `--destroy-foundation` only the ephemeral layer (components,
//! cluster) is removed and the foundation survives for the next `up`.
//! Destroying the foundation always asks for the lab name to be typed.

use clap::Args;

use lakelab_orchestrator::{DownOptions, DownReport, PhaseOrchestrator};

use super::print_warnings;
use crate::Result;

/// Tear down the cluster, optionally the foundation too
#[derive(Args, Debug)]
pub struct DownArgs {
    /// Skip the yes/no confirmation
    #[arg(short, long)]
    pub force: bool,

    /// Also destroy the database, object storage, network, and state backend
    #[arg(long)]
    pub destroy_foundation: bool,
}

/// Run the down command
pub async fn run(orch: &PhaseOrchestrator, args: DownArgs) -> Result<()> {
    let report = orch
        .down(&DownOptions {
            force: args.force,
            destroy_foundation: args.destroy_foundation,
        })
        .await?;
    print!("{}", describe(&report));
    print_warnings(&report.warnings);
    Ok(())
}

fn describe(report: &DownReport) -> String {
    if report.aborted {
        return "Aborted\n".to_string();
    }
    let mut out = String::new();
    if !report.uninstalled.is_empty() {
        out.push_str(&format!("Uninstalled: {}\n", report.uninstalled.join(", ")));
    }
    if report.cluster_destroyed {
        out.push_str("Cluster destroyed\n");
    }
    if report.foundation_destroyed {
        out.push_str("Foundation and state backend destroyed\n");
    }
    if out.is_empty() {
        out.push_str("Nothing to tear down\n");
    }
    out
}
