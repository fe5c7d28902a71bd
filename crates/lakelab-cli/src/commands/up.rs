//! Up command - cluster, essentials, and components
//!
//! Usage: lakelab up [components...] [--all] [--dry-run] [--force]
//!        [--skip-essentials] [--skip-components]
//!
//! With no component names and no `--all`, the default component set is
//! deployed. Named components must have their hard dependencies either
//! deployed already or named in the same invocation.

use clap::Args;

use lakelab_orchestrator::{PhaseOrchestrator, UpOptions, UpReport};

use super::{print_warnings, OutputFormat};
use crate::Result;

/// Bring up the cluster, essentials, and components
#[derive(Args, Debug)]
pub struct UpArgs {
    /// Components to deploy (default: the default component set)
    pub components: Vec<String>,

    /// Deploy every catalog component
    #[arg(long, conflicts_with = "components")]
    pub all: bool,

    /// Show the plan and deployment order without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Re-apply every step even if recorded as done
    #[arg(long)]
    pub force: bool,

    /// Do not install cluster essentials
    #[arg(long)]
    pub skip_essentials: bool,

    /// Stop after cluster essentials
    #[arg(long, conflicts_with_all = ["components", "all"])]
    pub skip_components: bool,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub output: OutputFormat,
}

impl From<&UpArgs> for UpOptions {
    fn from(args: &UpArgs) -> Self {
        Self {
            components: args.components.clone(),
            all: args.all,
            dry_run: args.dry_run,
            force: args.force,
            skip_essentials: args.skip_essentials,
            skip_components: args.skip_components,
        }
    }
}

/// Run the up command
pub async fn run(orch: &PhaseOrchestrator, args: UpArgs) -> Result<()> {
    let report = orch.up(&UpOptions::from(&args)).await?;
    match args.output {
        OutputFormat::Json => super::print_json(&report),
        OutputFormat::Table => {
            print!("{}", describe(&report, args.dry_run));
            print_warnings(&report.warnings);
            Ok(())
        }
    }
}

fn describe(report: &UpReport, dry_run: bool) -> String {
    let mut out = String::new();
    for plan in &report.plans {
        out.push_str(&format!("Planned {}: {}\n", plan.module, plan.summary));
    }
    if dry_run {
        for (i, batch) in report.batches.iter().enumerate() {
            let names: Vec<&str> = batch.iter().map(String::as_str).collect();
            out.push_str(&format!("Batch {}: {}\n", i + 1, names.join(", ")));
        }
        return out;
    }
    for module in &report.applied {
        out.push_str(&format!("Applied {}\n", module));
    }
    if !report.deployed.is_empty() {
        out.push_str(&format!("Deployed: {}\n", report.deployed.join(", ")));
    }
    if !report.skipped.is_empty() {
        out.push_str(&format!("Already deployed: {}\n", report.skipped.join(", ")));
    }
    out
}
