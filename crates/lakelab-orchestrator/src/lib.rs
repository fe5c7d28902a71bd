//! Lab lifecycle orchestration for lakelab
//!
//! This crate drives the phase state machine (`bootstrap`, `up`, `down`,
//! `status`) over the gateways in `lakelab-gateway`.
//!
//! Related crates:
//! - `lakelab-common`: state, config, errors, and the component graph
//! - `lakelab-gateway`: provisioner and deployment executor adapters

#![deny(missing_docs)]

pub mod confirm;
pub mod orchestrator;
mod phases;
pub mod status;

#[cfg(test)]
mod testing;

pub use confirm::Confirmer;
pub use orchestrator::{
    BootstrapOptions, BootstrapReport, DownOptions, DownReport, ModulePlan, PhaseOrchestrator,
    UpOptions, UpReport, MODULE_CLUSTER, MODULE_FOUNDATION, MODULE_STATE_BACKEND,
};
pub use status::{ComponentState, ComponentStatus, StatusReport};

// Re-export common error types
pub use lakelab_common::{Error, Result};
