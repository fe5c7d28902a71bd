//! Status command - recorded lab state plus live cluster status
//!
//! Usage: lakelab status [-o table|json]

use clap::Args;

use lakelab_orchestrator::{PhaseOrchestrator, StatusReport};

use super::format::{format_age, print_table, yes_no};
use super::{print_warnings, OutputFormat};
use crate::Result;

/// Show the lab state
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub output: OutputFormat,
}

/// Run the status command
pub async fn run(orch: &PhaseOrchestrator, args: StatusArgs) -> Result<()> {
    let report = orch.status().await?;
    match args.output {
        OutputFormat::Json => super::print_json(&report),
        OutputFormat::Table => {
            print_report(&report);
            Ok(())
        }
    }
}

fn print_report(report: &StatusReport) {
    let state = &report.state;
    println!("Lab:       {}", state.lab_name);
    println!("Region:    {}", report.region);
    println!("Phase:     {}", report.phase);
    println!("Updated:   {} ago", format_age(&state.updated_at));
    if let Some(status) = &report.cluster_status {
        println!("Cluster:   {}", status);
    }
    println!();

    print_table(&["STAGE", "DONE"], &phase_rows(report));
    println!();

    let outputs: Vec<Vec<String>> = [
        ("bootstrap", &state.outputs.bootstrap),
        ("foundation", &state.outputs.foundation),
        ("cluster", &state.outputs.cluster),
    ]
    .into_iter()
    .flat_map(|(stage, outputs)| {
        outputs
            .iter()
            .map(move |(k, v)| vec![stage.to_string(), k.clone(), v.clone()])
    })
    .collect();
    if !outputs.is_empty() {
        print_table(&["STAGE", "OUTPUT", "VALUE"], &outputs);
        println!();
    }

    print_table(
        &["COMPONENT", "NAMESPACE", "STATE", "LIVE", "ON FAILURE", "REQUIRES"],
        &component_rows(report),
    );
    print_warnings(&report.warnings);
}

fn phase_rows(report: &StatusReport) -> Vec<Vec<String>> {
    let state = &report.state;
    [
        ("state backend", state.bootstrapped),
        ("foundation", state.foundation_deployed),
        ("cluster", state.cluster_deployed),
        ("cluster ready", state.cluster_ready),
        ("essentials", state.essentials_deployed),
    ]
    .into_iter()
    .map(|(stage, done)| vec![stage.to_string(), yes_no(done).to_string()])
    .collect()
}

fn component_rows(report: &StatusReport) -> Vec<Vec<String>> {
    report
        .components
        .iter()
        .map(|c| {
            let policy = match c.policy {
                Some(lakelab_common::FailurePolicy::Abort) => "abort",
                Some(lakelab_common::FailurePolicy::Continue) => "continue",
                None => "-",
            };
            let requires = if c.hard_dependencies.is_empty() {
                "-".to_string()
            } else {
                c.hard_dependencies.join(",")
            };
            vec![
                c.name.clone(),
                c.namespace.clone(),
                c.state.to_string(),
                c.live_status.clone().unwrap_or_else(|| "-".to_string()),
                policy.to_string(),
                requires,
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakelab_common::{FailurePolicy, LabState};
    use lakelab_orchestrator::{ComponentState, ComponentStatus};

    fn report() -> StatusReport {
        let mut state = LabState::new("demo");
        state.bootstrapped = true;
        StatusReport {
            phase: state.phase().to_string(),
            region: "us-east-1".to_string(),
            cluster_status: None,
            components: vec![ComponentStatus {
                name: "polaris".to_string(),
                namespace: "polaris".to_string(),
                release: "polaris".to_string(),
                state: ComponentState::Failed,
                policy: Some(FailurePolicy::Abort),
                hard_dependencies: vec!["keycloak".to_string()],
                soft_dependencies: Vec::new(),
                default: true,
                live_status: Some("failed".to_string()),
            }],
            releases: Vec::new(),
            state,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn phase_rows_follow_flags() {
        let rows = phase_rows(&report());
        assert_eq!(rows[0], vec!["state backend", "yes"]);
        assert_eq!(rows[1], vec!["foundation", "no"]);
    }

    #[test]
    fn component_rows_show_policy_and_requirements() {
        let rows = component_rows(&report());
        assert_eq!(rows[0], vec!["polaris", "polaris", "failed", "failed", "abort", "keycloak"]);
    }

    #[test]
    fn unlisted_release_shows_dash() {
        let mut report = report();
        report.components[0].live_status = None;
        assert_eq!(component_rows(&report)[0][3], "-");
    }
}
