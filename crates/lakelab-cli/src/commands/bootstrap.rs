//! Bootstrap command - provision the state backend and foundation
//!
//! Usage: lakelab bootstrap [--dry-run] [--skip-foundation] [--force]

use clap::Args;

use lakelab_orchestrator::{BootstrapOptions, BootstrapReport, PhaseOrchestrator};

use super::{print_warnings, OutputFormat};
use crate::Result;

/// Provision the state backend and the long-lived foundation
#[derive(Args, Debug)]
pub struct BootstrapArgs {
    /// Show the provisioner plan without applying anything
    #[arg(long)]
    pub dry_run: bool,

    /// Stop after the state backend
    #[arg(long)]
    pub skip_foundation: bool,

    /// Re-apply even if already bootstrapped
    #[arg(long)]
    pub force: bool,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub output: OutputFormat,
}

impl From<&BootstrapArgs> for BootstrapOptions {
    fn from(args: &BootstrapArgs) -> Self {
        Self {
            dry_run: args.dry_run,
            skip_foundation: args.skip_foundation,
            force: args.force,
        }
    }
}

/// Run the bootstrap command
pub async fn run(orch: &PhaseOrchestrator, args: BootstrapArgs) -> Result<()> {
    let report = orch.bootstrap(&BootstrapOptions::from(&args)).await?;
    match args.output {
        OutputFormat::Json => super::print_json(&report),
        OutputFormat::Table => {
            print_report(orch.config().lab.as_str(), &report);
            Ok(())
        }
    }
}

fn print_report(lab: &str, report: &BootstrapReport) {
    if report.noop {
        println!("Lab '{}' is already bootstrapped.", lab);
        return;
    }
    if !report.plans.is_empty() {
        println!("Planned changes (nothing applied):");
        for plan in &report.plans {
            println!("  {:<16} {}", plan.module, plan.summary);
        }
    }
    for module in &report.applied {
        println!("Applied {}", module);
    }
    print_warnings(&report.warnings);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_map_to_options() {
        let args = BootstrapArgs {
            dry_run: true,
            skip_foundation: false,
            force: true,
            output: OutputFormat::Table,
        };
        let opts = BootstrapOptions::from(&args);
        assert!(opts.dry_run && opts.force && !opts.skip_foundation);
    }
}
