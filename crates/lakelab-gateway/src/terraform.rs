//! Terraform adapter
//!
//! Each call runs `init` first (reconfiguring the backend from the
//! [`ModuleRun`]), then the requested operation. Variables go through a
//! temporary `.tfvars.json` file so values keep their JSON types.

use std::io::Write;
use std::sync::Arc;

use tracing::{debug, info};

use lakelab_common::{Error, Outputs, Result};

use crate::command::{CommandOutput, CommandRunner, Invocation};
use crate::provisioner::{BackendConfig, ModuleRun, PlanSummary};

const LOCK_ERROR_MARKER: &str = "Error acquiring the state lock";

/// Runs terraform through a [`CommandRunner`]
pub struct Terraform {
    runner: Arc<dyn CommandRunner>,
    binary: String,
}

impl Terraform {
    /// Create an adapter using `terraform` from `PATH`
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            binary: "terraform".to_string(),
        }
    }

    /// Preview changes
    pub async fn plan(&self, run: &ModuleRun) -> Result<PlanSummary> {
        self.init(run).await?;
        let vars = write_var_file(run)?;
        let out = self
            .exec(
                run,
                "plan",
                ["plan", "-input=false", "-no-color", "-lock-timeout=30s"]
                    .into_iter()
                    .map(String::from)
                    .chain(var_file_arg(&vars)),
            )
            .await?;
        let summary = parse_plan_summary(&out.stdout)
            .ok_or_else(|| Error::provisioner(&run.name, "plan", "could not find plan summary in output"))?;
        info!(module = %run.name, plan = %summary, "planned");
        Ok(summary)
    }

    /// Apply and return outputs
    pub async fn apply(&self, run: &ModuleRun) -> Result<Outputs> {
        self.init(run).await?;
        let vars = write_var_file(run)?;
        info!(module = %run.name, dir = %run.dir.display(), "applying");
        self.exec(
            run,
            "apply",
            ["apply", "-input=false", "-no-color", "-auto-approve", "-lock-timeout=30s"]
                .into_iter()
                .map(String::from)
                .chain(var_file_arg(&vars)),
        )
        .await?;
        self.read_outputs(run).await
    }

    /// Destroy all module resources
    pub async fn destroy(&self, run: &ModuleRun) -> Result<()> {
        self.init(run).await?;
        let vars = write_var_file(run)?;
        info!(module = %run.name, dir = %run.dir.display(), "destroying");
        self.exec(
            run,
            "destroy",
            ["destroy", "-input=false", "-no-color", "-auto-approve", "-lock-timeout=30s"]
                .into_iter()
                .map(String::from)
                .chain(var_file_arg(&vars)),
        )
        .await?;
        Ok(())
    }

    /// Current outputs
    pub async fn output(&self, run: &ModuleRun) -> Result<Outputs> {
        self.init(run).await?;
        self.read_outputs(run).await
    }

    async fn read_outputs(&self, run: &ModuleRun) -> Result<Outputs> {
        let out = self
            .exec(run, "output", ["output", "-json", "-no-color"].map(String::from))
            .await?;
        parse_outputs(&out.stdout).map_err(|e| Error::provisioner(&run.name, "output", e))
    }

    async fn init(&self, run: &ModuleRun) -> Result<()> {
        let mut args = vec![
            "init".to_string(),
            "-input=false".to_string(),
            "-no-color".to_string(),
        ];
        if let Some(backend) = &run.backend {
            args.push("-reconfigure".to_string());
            args.extend(backend_args(backend));
        }
        self.exec(run, "init", args).await?;
        Ok(())
    }

    async fn exec(
        &self,
        run: &ModuleRun,
        operation: &str,
        args: impl IntoIterator<Item = String>,
    ) -> Result<CommandOutput> {
        let invocation = Invocation::new(&self.binary)
            .arg(format!("-chdir={}", run.dir.display()))
            .args(args)
            .env("TF_IN_AUTOMATION", "1");
        let out = self.runner.run(invocation).await?;
        if out.success {
            debug!(module = %run.name, operation, "terraform succeeded");
            return Ok(out);
        }

        let text = out.error_text();
        if text.contains(LOCK_ERROR_MARKER) {
            return Err(Error::StateLocked {
                module: run.name.clone(),
                message: text,
            });
        }
        Err(Error::provisioner(&run.name, operation, text))
    }
}

fn backend_args(backend: &BackendConfig) -> Vec<String> {
    vec![
        format!("-backend-config=bucket={}", backend.bucket),
        format!("-backend-config=key={}", backend.key),
        format!("-backend-config=region={}", backend.region),
        format!("-backend-config=dynamodb_table={}", backend.lock_table),
        "-backend-config=encrypt=true".to_string(),
    ]
}

fn write_var_file(run: &ModuleRun) -> Result<Option<tempfile::NamedTempFile>> {
    if run.vars.is_empty() {
        return Ok(None);
    }
    let mut file = tempfile::Builder::new()
        .prefix("lakelab-")
        .suffix(".tfvars.json")
        .tempfile()?;
    file.write_all(&serde_json::to_vec(&run.vars)?)?;
    file.flush()?;
    Ok(Some(file))
}

fn var_file_arg(file: &Option<tempfile::NamedTempFile>) -> Option<String> {
    file.as_ref()
        .map(|f| format!("-var-file={}", f.path().display()))
}

/// Parse `Plan: X to add, Y to change, Z to destroy.` or `No changes.`
pub(crate) fn parse_plan_summary(stdout: &str) -> Option<PlanSummary> {
    for line in stdout.lines() {
        let line = line.trim();
        if line.starts_with("No changes.") {
            return Some(PlanSummary::default());
        }
        if let Some(rest) = line.strip_prefix("Plan:") {
            let mut summary = PlanSummary::default();
            for part in rest.trim().trim_end_matches('.').split(',') {
                let mut words = part.split_whitespace();
                let count: u32 = words.next()?.parse().ok()?;
                match words.nth(1)? {
                    "add" => summary.add = count,
                    "change" => summary.change = count,
                    "destroy" => summary.destroy = count,
                    _ => {}
                }
            }
            return Some(summary);
        }
    }
    None
}

/// Flatten `terraform output -json` into strings.
///
/// String values are taken verbatim; everything else is kept as compact JSON.
pub(crate) fn parse_outputs(stdout: &str) -> std::result::Result<Outputs, String> {
    let doc: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(stdout).map_err(|e| format!("invalid output JSON: {}", e))?;

    let mut outputs = Outputs::new();
    for (key, entry) in doc {
        let value = entry
            .get("value")
            .ok_or_else(|| format!("output '{}' has no value", key))?;
        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        outputs.insert(key, rendered);
    }
    Ok(outputs)
}
