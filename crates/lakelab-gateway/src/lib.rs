//! External collaborator boundaries for lakelab
//!
//! The orchestrator only sees [`ProvisionerGateway`] and
//! [`DeploymentGateway`]. The concrete implementations shell out to
//! terraform, the AWS CLI, and helm through [`CommandRunner`], and talk to
//! the cluster API with kube-rs.

#![deny(missing_docs)]

pub mod aws;
pub mod cluster;
pub mod command;
pub mod deployment;
pub mod helm;
pub mod provisioner;
pub mod terraform;

pub use cluster::{NodeReadiness, PodState};
pub use command::{CommandOutput, CommandRunner, Invocation, TokioCommandRunner};
pub use deployment::{ClusterDeployer, DeploymentGateway, RELEASE_DEPLOYED};
pub use helm::{InstallRequest, ReleaseInfo};
pub use provisioner::{
    BackendConfig, CloudProvisioner, ClusterStatus, DatabaseStatus, ModuleRun, PlanSummary,
    ProvisionerGateway,
};
