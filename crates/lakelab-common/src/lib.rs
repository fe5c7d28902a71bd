//! Common types for lakelab: lab state, errors, config, and the component graph

#![deny(missing_docs)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod graph;
pub mod poll;
pub mod state;
pub mod store;

pub use config::LabConfig;
pub use error::Error;
pub use graph::{ComponentSpec, DependencyResolver, FailurePolicy};
pub use poll::{PollResult, ReadinessPoller};
pub use state::{ComponentRecord, LabState, MacroPhase, Outputs};
pub use store::StateStore;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// State-backend output naming the provisioner state bucket
pub const OUTPUT_STATE_BUCKET: &str = "state_bucket";

/// State-backend output naming the provisioner lock table
pub const OUTPUT_LOCK_TABLE: &str = "lock_table";

/// Foundation output naming the lakehouse object store
pub const OUTPUT_BUCKET_NAME: &str = "bucket_name";

/// Foundation output naming the managed database instance
pub const OUTPUT_DB_INSTANCE_ID: &str = "db_instance_id";

/// Cluster output naming the compute cluster
pub const OUTPUT_CLUSTER_NAME: &str = "cluster_name";
