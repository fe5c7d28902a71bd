//! Error types for lab lifecycle operations
//!
//! Errors are structured with fields so the command boundary can print a
//! classified message: which module, component, or phase failed and why.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for lab lifecycle operations
#[derive(Debug, Error)]
pub enum Error {
    /// A requested component needs a predecessor that is neither deployed
    /// nor part of the same request
    #[error("component '{component}' has unmet hard dependency '{missing}' (deploy it first or request it together)")]
    UnmetHardDependency {
        /// Component that was requested
        component: String,
        /// Hard dependency that is missing
        missing: String,
    },

    /// A component name that is not in the catalog
    #[error("unknown component '{name}'")]
    UnknownComponent {
        /// The unknown name
        name: String,
    },

    /// The component graph contains a cycle
    #[error("dependency cycle between components: {}", components.join(", "))]
    DependencyCycle {
        /// Components that could not be ordered
        components: Vec<String>,
    },

    /// The infrastructure provisioner failed (plan/apply/destroy/output) or
    /// reported a failed resource
    #[error("provisioner {operation} failed for module '{module}': {message}")]
    ProvisionerFailure {
        /// Module directory or logical module name
        module: String,
        /// Operation that failed (init, plan, apply, destroy, output, inspect)
        operation: String,
        /// Description of what failed
        message: String,
    },

    /// The provisioner could not acquire its state lock
    #[error("provisioner state for module '{module}' is locked by another operation: {message}")]
    StateLocked {
        /// Module whose state is locked
        module: String,
        /// Lock details reported by the provisioner
        message: String,
    },

    /// A release install/uninstall failed
    #[error("deployment of '{component}' failed: {message}")]
    DeploymentFailure {
        /// Component or release that failed
        component: String,
        /// Description of what failed
        message: String,
    },

    /// One or more optional components failed while the rest of the command completed
    #[error("{} component(s) failed to deploy: {}", failed.len(), failed.join(", "))]
    ComponentsFailed {
        /// Names of failed components
        failed: Vec<String>,
    },

    /// Polling exceeded its bound
    #[error("timed out after {elapsed:?} waiting for {what} (last status: {last_detail})")]
    ReadinessTimeout {
        /// What was being waited for
        what: String,
        /// How long the wait ran
        elapsed: Duration,
        /// Last NotReady detail observed
        last_detail: String,
    },

    /// A polled resource entered a terminal failure state
    #[error("{what} entered a terminal state: {detail}")]
    ReadinessFatal {
        /// What was being waited for
        what: String,
        /// Terminal status detail
        detail: String,
    },

    /// A wait was cancelled by the operator or a parent timeout
    #[error("cancelled while waiting for {what}")]
    Cancelled {
        /// What was being waited for
        what: String,
    },

    /// The persisted lab record failed validation
    #[error("state file {path} is corrupt: {message}. Inspect or restore the file manually; it will not be overwritten")]
    StateCorruption {
        /// Path of the state file
        path: PathBuf,
        /// What failed to validate
        message: String,
    },

    /// Refused to persist an illegal combination of phase flags
    #[error("refusing to persist invalid lab state: {message}")]
    InvariantViolation {
        /// Which invariant was violated
        message: String,
    },

    /// A phase was requested before its prerequisites completed
    #[error("{phase} is not ready: {hint}")]
    PhaseNotReady {
        /// Phase that is missing
        phase: String,
        /// What the operator should run
        hint: String,
    },

    /// A required external tool is not installed
    #[error("{tool} not found. {hint}")]
    MissingTool {
        /// Tool binary name
        tool: String,
        /// Installation hint
        hint: String,
    },

    /// Configuration could not be loaded or is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    /// A confirmation safeguard was not satisfied
    #[error("confirmation failed: {message}")]
    Confirmation {
        /// Description of the mismatch
        message: String,
    },

    /// Generic validation error
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
    },

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Create a provisioner failure for a module operation
    pub fn provisioner(
        module: impl Into<String>,
        operation: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::ProvisionerFailure {
            module: module.into(),
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Create a deployment failure for a component
    pub fn deployment_for(component: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::DeploymentFailure {
            component: component.into(),
            message: msg.into(),
        }
    }

    /// Create a phase precondition error
    pub fn phase_not_ready(phase: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::PhaseNotReady {
            phase: phase.into(),
            hint: hint.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a state corruption error for a state file
    pub fn corruption(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::StateCorruption {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Whether re-invoking the same command may succeed without operator changes.
    ///
    /// Nothing is retried automatically; this only decides whether the CLI
    /// suggests re-running.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::StateLocked { .. }
                | Error::ReadinessTimeout { .. }
                | Error::Cancelled { .. }
                | Error::ComponentsFailed { .. }
                | Error::DeploymentFailure { .. }
        )
    }

    /// Short classification used as the prefix of the CLI error line
    pub fn class(&self) -> &'static str {
        match self {
            Error::UnmetHardDependency { .. }
            | Error::UnknownComponent { .. }
            | Error::DependencyCycle { .. } => "dependency",
            Error::ProvisionerFailure { .. } | Error::StateLocked { .. } => "provisioner",
            Error::DeploymentFailure { .. } | Error::ComponentsFailed { .. } => "deployment",
            Error::ReadinessTimeout { .. }
            | Error::ReadinessFatal { .. }
            | Error::Cancelled { .. } => "readiness",
            Error::StateCorruption { .. } | Error::InvariantViolation { .. } => "state",
            Error::PhaseNotReady { .. } => "phase",
            Error::MissingTool { .. } => "preflight",
            Error::Config { .. } | Error::Yaml(_) => "config",
            Error::Confirmation { .. } => "confirmation",
            Error::Validation { .. } => "validation",
            Error::Io(_) | Error::Json(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmet_dependency_names_both_components() {
        let err = Error::UnmetHardDependency {
            component: "trino".to_string(),
            missing: "polaris".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("trino"));
        assert!(msg.contains("polaris"));
        assert_eq!(err.class(), "dependency");
        assert!(!err.is_retryable());
    }

    #[test]
    fn readiness_timeout_reports_elapsed_and_last_detail() {
        let err = Error::ReadinessTimeout {
            what: "cluster lab-cluster".to_string(),
            elapsed: Duration::from_secs(90),
            last_detail: "CREATING".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("90s"));
        assert!(msg.contains("CREATING"));
        assert!(err.is_retryable());
    }

    #[test]
    fn state_lock_is_retryable_but_provisioner_failure_is_not() {
        let locked = Error::StateLocked {
            module: "cluster".to_string(),
            message: "lock id 1234".to_string(),
        };
        assert!(locked.is_retryable());
        assert_eq!(locked.class(), "provisioner");

        let failed = Error::provisioner("cluster", "apply", "exit status 1");
        assert!(!failed.is_retryable());
        assert!(failed.to_string().contains("apply"));
    }

    #[test]
    fn corruption_instructs_manual_recovery() {
        let err = Error::corruption("/tmp/demo.json", "missing field `labName`");
        assert!(err.to_string().contains("manually"));
        assert_eq!(err.class(), "state");
    }

    #[test]
    fn components_failed_lists_names() {
        let err = Error::ComponentsFailed {
            failed: vec!["trino".to_string(), "opa".to_string()],
        };
        assert_eq!(err.to_string(), "2 component(s) failed to deploy: trino, opa");
    }
}
