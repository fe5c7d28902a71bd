//! Phase handlers for the lab lifecycle.
//!
//! Each stage of `bootstrap`, `up`, and `down` lives in its own module and
//! operates on the orchestrator plus the in-memory [`LabState`] it threads
//! through. Handlers checkpoint the state themselves after every durable
//! step.
//!
//! [`LabState`]: lakelab_common::LabState

pub(crate) mod bootstrap;
pub(crate) mod cluster;
pub(crate) mod components;
pub(crate) mod essentials;
pub(crate) mod teardown;
