//! Infrastructure provisioner boundary
//!
//! [`ProvisionerGateway`] is everything the orchestrator needs from the
//! infrastructure side: module plan/apply/destroy/output plus read-only
//! inspection of live resources. Mutating calls assume the provisioner
//! reconciles desired vs actual state, so calling them twice is safe.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use lakelab_common::{Error, Outputs, Result, OUTPUT_LOCK_TABLE, OUTPUT_STATE_BUCKET};

use crate::aws::AwsCli;
use crate::command::{require_tools, CommandRunner};
use crate::terraform::Terraform;

/// Remote state location for a module
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// State bucket
    pub bucket: String,
    /// Object key within the bucket
    pub key: String,
    /// Bucket region
    pub region: String,
    /// Lock table
    pub lock_table: String,
}

impl BackendConfig {
    /// Generate the backend for `module` from the state-backend outputs.
    ///
    /// Keys are `<lab>/<module>.tfstate` so labs sharing a bucket never
    /// touch each other's state.
    pub fn for_module(lab: &str, module: &str, region: &str, bootstrap: &Outputs) -> Result<Self> {
        let get = |key: &str| {
            bootstrap.get(key).cloned().ok_or_else(|| {
                Error::phase_not_ready(
                    "state backend",
                    format!("bootstrap output '{}' is missing; run `lakelab bootstrap --force`", key),
                )
            })
        };
        Ok(Self {
            bucket: get(OUTPUT_STATE_BUCKET)?,
            key: format!("{}/{}.tfstate", lab, module),
            region: region.to_string(),
            lock_table: get(OUTPUT_LOCK_TABLE)?,
        })
    }
}

/// One provisioner module invocation
#[derive(Clone, Debug, PartialEq)]
pub struct ModuleRun {
    /// Logical module name used in errors and logs
    pub name: String,
    /// Module directory
    pub dir: PathBuf,
    /// Input variables
    pub vars: BTreeMap<String, serde_json::Value>,
    /// Remote state; `None` keeps state local to the module directory
    pub backend: Option<BackendConfig>,
}

/// Resource changes a plan would make
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    /// Resources to create
    pub add: u32,
    /// Resources to update in place
    pub change: u32,
    /// Resources to destroy
    pub destroy: u32,
}

impl PlanSummary {
    /// Whether the plan is a no-op
    pub fn is_empty(&self) -> bool {
        self.add == 0 && self.change == 0 && self.destroy == 0
    }
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to add, {} to change, {} to destroy",
            self.add, self.change, self.destroy
        )
    }
}

/// Control-plane status of the compute cluster
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterStatus {
    /// Being created
    Creating,
    /// Serving requests
    Active,
    /// Being updated; still serving
    Updating,
    /// Being deleted
    Deleting,
    /// Creation or update failed
    Failed,
    /// Accepted but not started
    Pending,
    /// No such cluster
    NotFound,
    /// Status string this tool does not know
    Unknown(String),
}

impl ClusterStatus {
    /// Parse the provider's status string
    pub fn parse(status: &str) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "CREATING" => Self::Creating,
            "ACTIVE" => Self::Active,
            "UPDATING" => Self::Updating,
            "DELETING" => Self::Deleting,
            "FAILED" => Self::Failed,
            "PENDING" => Self::Pending,
            _ => Self::Unknown(status.to_string()),
        }
    }

    /// A state the cluster cannot become ready from
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Deleting)
    }
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Creating => write!(f, "CREATING"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Updating => write!(f, "UPDATING"),
            Self::Deleting => write!(f, "DELETING"),
            Self::Failed => write!(f, "FAILED"),
            Self::Pending => write!(f, "PENDING"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::Unknown(s) => write!(f, "{}", s),
        }
    }
}

/// Managed database instance status
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseStatus {
    /// Accepting connections
    Available,
    /// Stopped by the operator
    Stopped,
    /// Any transitional or failure status, verbatim
    Other(String),
}

impl DatabaseStatus {
    /// Parse the provider's status string
    pub fn parse(status: &str) -> Self {
        match status {
            "available" => Self::Available,
            "stopped" => Self::Stopped,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for DatabaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Stopped => write!(f, "stopped"),
            Self::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Infrastructure provisioner plus live-resource inspection
#[async_trait]
pub trait ProvisionerGateway: Send + Sync {
    /// Fail with `MissingTool` if a required binary is unavailable
    async fn preflight(&self) -> Result<()>;

    /// Compute the changes `apply` would make
    async fn plan(&self, run: &ModuleRun) -> Result<PlanSummary>;

    /// Reconcile the module and return its outputs
    async fn apply(&self, run: &ModuleRun) -> Result<Outputs>;

    /// Destroy everything the module manages
    async fn destroy(&self, run: &ModuleRun) -> Result<()>;

    /// Read the module's current outputs
    async fn output(&self, run: &ModuleRun) -> Result<Outputs>;

    /// Control-plane status of a cluster
    async fn cluster_status(&self, name: &str) -> Result<ClusterStatus>;

    /// Whether an object store bucket exists and is reachable
    async fn object_store_exists(&self, name: &str) -> Result<bool>;

    /// Database instance status, `None` when it does not exist
    async fn database_status(&self, id: &str) -> Result<Option<DatabaseStatus>>;

    /// Key/value pairs of a secret-store entry
    async fn read_secret(&self, reference: &str) -> Result<BTreeMap<String, String>>;

    /// Write a kubeconfig for `cluster` to `path`
    async fn write_kubeconfig(&self, cluster: &str, path: &Path) -> Result<()>;
}

/// Terraform for modules, the AWS CLI for inspection
pub struct CloudProvisioner {
    runner: Arc<dyn CommandRunner>,
    terraform: Terraform,
    aws: AwsCli,
}

impl CloudProvisioner {
    /// Create a provisioner for `region`
    pub fn new(runner: Arc<dyn CommandRunner>, region: impl Into<String>) -> Self {
        Self {
            terraform: Terraform::new(runner.clone()),
            aws: AwsCli::new(runner.clone(), region),
            runner,
        }
    }
}

#[async_trait]
impl ProvisionerGateway for CloudProvisioner {
    async fn preflight(&self) -> Result<()> {
        require_tools(self.runner.as_ref(), &["terraform", "aws"]).await
    }

    async fn plan(&self, run: &ModuleRun) -> Result<PlanSummary> {
        self.terraform.plan(run).await
    }

    async fn apply(&self, run: &ModuleRun) -> Result<Outputs> {
        self.terraform.apply(run).await
    }

    async fn destroy(&self, run: &ModuleRun) -> Result<()> {
        self.terraform.destroy(run).await
    }

    async fn output(&self, run: &ModuleRun) -> Result<Outputs> {
        self.terraform.output(run).await
    }

    async fn cluster_status(&self, name: &str) -> Result<ClusterStatus> {
        self.aws.cluster_status(name).await
    }

    async fn object_store_exists(&self, name: &str) -> Result<bool> {
        self.aws.bucket_exists(name).await
    }

    async fn database_status(&self, id: &str) -> Result<Option<DatabaseStatus>> {
        self.aws.database_status(id).await
    }

    async fn read_secret(&self, reference: &str) -> Result<BTreeMap<String, String>> {
        self.aws.read_secret(reference).await
    }

    async fn write_kubeconfig(&self, cluster: &str, path: &Path) -> Result<()> {
        self.aws.update_kubeconfig(cluster, path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bootstrap_outputs() -> Outputs {
        let mut outputs = Outputs::new();
        outputs.insert(OUTPUT_STATE_BUCKET.to_string(), "demo-tfstate".to_string());
        outputs.insert(OUTPUT_LOCK_TABLE.to_string(), "demo-locks".to_string());
        outputs
    }

    #[test]
    fn backend_key_is_scoped_to_lab_and_module() {
        let backend =
            BackendConfig::for_module("demo", "cluster", "eu-west-1", &bootstrap_outputs()).unwrap();
        assert_eq!(
            backend,
            BackendConfig {
                bucket: "demo-tfstate".to_string(),
                key: "demo/cluster.tfstate".to_string(),
                region: "eu-west-1".to_string(),
                lock_table: "demo-locks".to_string(),
            }
        );
    }

    #[test]
    fn backend_without_bootstrap_outputs_is_phase_error() {
        let err = BackendConfig::for_module("demo", "foundation", "us-east-1", &Outputs::new())
            .unwrap_err();
        assert!(matches!(err, Error::PhaseNotReady { .. }));
        assert!(err.to_string().contains(OUTPUT_STATE_BUCKET));
    }

    #[test]
    fn cluster_status_parsing() {
        assert_eq!(ClusterStatus::parse("ACTIVE"), ClusterStatus::Active);
        assert_eq!(ClusterStatus::parse("creating"), ClusterStatus::Creating);
        assert!(ClusterStatus::parse("FAILED").is_terminal_failure());
        assert!(ClusterStatus::parse("DELETING").is_terminal_failure());
        assert!(!ClusterStatus::parse("UPDATING").is_terminal_failure());
        assert_eq!(
            ClusterStatus::parse("MIGRATING"),
            ClusterStatus::Unknown("MIGRATING".to_string())
        );
    }

    #[test]
    fn plan_summary_display() {
        let plan = PlanSummary {
            add: 12,
            change: 0,
            destroy: 1,
        };
        assert_eq!(plan.to_string(), "12 to add, 0 to change, 1 to destroy");
        assert!(!plan.is_empty());
        assert!(PlanSummary::default().is_empty());
    }
}
