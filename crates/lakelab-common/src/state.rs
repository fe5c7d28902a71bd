//! Persisted lifecycle record for one lab
//!
//! `LabState` is the only thing that survives between CLI invocations. Phase
//! flags form a chain (`essentialsDeployed ⇒ clusterReady ⇒ clusterDeployed ⇒
//! foundationDeployed ⇒ bootstrapped`) that [`LabState::validate`] enforces
//! before every save.
//!
//! Maps are `BTreeMap` so serialization is deterministic: two saves of an
//! unchanged record differ only in `updatedAt`.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Current schema version written to every state file
pub const STATE_VERSION: u32 = 1;

/// Opaque key/value outputs captured from the provisioner
pub type Outputs = BTreeMap<String, String>;

/// Output bundles captured at each provisioning phase
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseOutputs {
    /// State-backend outputs (state bucket, lock table)
    #[serde(default)]
    pub bootstrap: Outputs,
    /// Foundation outputs (network, database, object store, credential reference)
    #[serde(default)]
    pub foundation: Outputs,
    /// Cluster outputs (cluster name, endpoint)
    #[serde(default)]
    pub cluster: Outputs,
}

/// Deployment record for one component
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRecord {
    /// Whether the last attempt succeeded
    pub deployed: bool,
    /// Namespace the release lives in
    pub namespace: String,
    /// Release name
    pub release_name: String,
    /// When the component was last deployed successfully
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_at: Option<DateTime<Utc>>,
}

impl ComponentRecord {
    /// Record a successful deployment
    pub fn deployed(namespace: impl Into<String>, release: impl Into<String>) -> Self {
        Self {
            deployed: true,
            namespace: namespace.into(),
            release_name: release.into(),
            deployed_at: Some(Utc::now()),
        }
    }

    /// Record an attempted deployment that failed
    pub fn failed(namespace: impl Into<String>, release: impl Into<String>) -> Self {
        Self {
            deployed: false,
            namespace: namespace.into(),
            release_name: release.into(),
            deployed_at: None,
        }
    }
}

/// Top-level macro phase derived from the phase flags
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MacroPhase {
    /// Nothing provisioned
    Unbootstrapped,
    /// State backend exists
    Bootstrapped,
    /// Foundation (network, database, object storage) exists
    FoundationReady,
    /// Cluster provisioned and ready
    ClusterUp,
    /// Essentials installed; components may be deployed
    Operational,
}

impl std::fmt::Display for MacroPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MacroPhase::Unbootstrapped => write!(f, "Unbootstrapped"),
            MacroPhase::Bootstrapped => write!(f, "Bootstrapped"),
            MacroPhase::FoundationReady => write!(f, "FoundationReady"),
            MacroPhase::ClusterUp => write!(f, "ClusterUp"),
            MacroPhase::Operational => write!(f, "Operational"),
        }
    }
}

/// The persisted lifecycle record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabState {
    /// Schema version
    pub version: u32,
    /// Lab name (one state file per lab)
    pub lab_name: String,
    /// When the record was first created
    pub created_at: DateTime<Utc>,
    /// Refreshed on every save, strictly increasing
    pub updated_at: DateTime<Utc>,
    /// State backend provisioned
    #[serde(default)]
    pub bootstrapped: bool,
    /// Foundation provisioned
    #[serde(default)]
    pub foundation_deployed: bool,
    /// Cluster provisioned
    #[serde(default)]
    pub cluster_deployed: bool,
    /// Cluster active and nodes ready
    #[serde(default)]
    pub cluster_ready: bool,
    /// Namespaces, credential secret, and essential releases installed
    #[serde(default)]
    pub essentials_deployed: bool,
    /// Provisioner outputs per phase
    #[serde(default)]
    pub outputs: PhaseOutputs,
    /// Component records keyed by component name
    #[serde(default)]
    pub components: BTreeMap<String, ComponentRecord>,
}

impl LabState {
    /// Create the initial empty record for a lab
    pub fn new(lab_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            version: STATE_VERSION,
            lab_name: lab_name.into(),
            created_at: now,
            updated_at: now,
            bootstrapped: false,
            foundation_deployed: false,
            cluster_deployed: false,
            cluster_ready: false,
            essentials_deployed: false,
            outputs: PhaseOutputs::default(),
            components: BTreeMap::new(),
        }
    }

    /// Check the phase-flag chain
    pub fn validate(&self) -> Result<()> {
        let chain = [
            ("essentialsDeployed", self.essentials_deployed, "clusterReady", self.cluster_ready),
            ("clusterReady", self.cluster_ready, "clusterDeployed", self.cluster_deployed),
            ("clusterDeployed", self.cluster_deployed, "foundationDeployed", self.foundation_deployed),
            ("foundationDeployed", self.foundation_deployed, "bootstrapped", self.bootstrapped),
        ];

        for (later, later_set, prereq, prereq_set) in chain {
            if later_set && !prereq_set {
                return Err(Error::InvariantViolation {
                    message: format!("{} is true while {} is false", later, prereq),
                });
            }
        }

        if !self.essentials_deployed && self.components.values().any(|c| c.deployed) {
            return Err(Error::InvariantViolation {
                message: "components recorded as deployed without essentials".to_string(),
            });
        }

        Ok(())
    }

    /// Macro phase implied by the flags
    pub fn phase(&self) -> MacroPhase {
        if self.essentials_deployed {
            MacroPhase::Operational
        } else if self.cluster_ready {
            MacroPhase::ClusterUp
        } else if self.foundation_deployed {
            MacroPhase::FoundationReady
        } else if self.bootstrapped {
            MacroPhase::Bootstrapped
        } else {
            MacroPhase::Unbootstrapped
        }
    }

    /// Advance `updated_at`, keeping it strictly increasing even if the clock stalls
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::microseconds(1)
        };
    }

    /// Record the state backend as provisioned
    pub fn mark_bootstrapped(&mut self, outputs: Outputs) {
        self.bootstrapped = true;
        self.outputs.bootstrap = outputs;
    }

    /// Record the foundation as provisioned
    pub fn mark_foundation(&mut self, outputs: Outputs) {
        self.foundation_deployed = true;
        self.outputs.foundation = outputs;
    }

    /// Record the cluster as provisioned (not yet ready)
    pub fn mark_cluster_deployed(&mut self, outputs: Outputs) {
        self.cluster_deployed = true;
        self.cluster_ready = false;
        self.outputs.cluster = outputs;
    }

    /// Record the cluster as active with ready nodes
    pub fn mark_cluster_ready(&mut self) {
        self.cluster_ready = true;
    }

    /// Record cluster essentials as installed
    pub fn mark_essentials(&mut self) {
        self.essentials_deployed = true;
    }

    /// Names of components recorded as deployed
    pub fn deployed_components(&self) -> Vec<String> {
        self.components
            .iter()
            .filter(|(_, record)| record.deployed)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Whether a component is recorded as deployed
    pub fn is_deployed(&self, component: &str) -> bool {
        self.components
            .get(component)
            .map(|record| record.deployed)
            .unwrap_or(false)
    }

    /// Clear the ephemeral layer: cluster, essentials, components.
    ///
    /// Foundation and bootstrap state are left untouched.
    pub fn clear_ephemeral(&mut self) {
        self.cluster_deployed = false;
        self.cluster_ready = false;
        self.essentials_deployed = false;
        self.outputs.cluster.clear();
        self.components.clear();
    }

    /// Clear the foundation layer (the ephemeral layer must already be gone)
    pub fn clear_foundation(&mut self) {
        self.clear_ephemeral();
        self.foundation_deployed = false;
        self.outputs.foundation.clear();
    }

    /// Reset to the initial empty record, keeping the lab name and creation time
    pub fn reset(&mut self) {
        let created_at = self.created_at;
        let updated_at = self.updated_at;
        *self = LabState::new(self.lab_name.clone());
        self.created_at = created_at;
        self.updated_at = updated_at;
    }
}

/// Upgrade a raw state document to the current schema.
///
/// v0 records have no `version` field and keep outputs in top-level
/// `bootstrapOutputs`, `foundationOutputs`, and `clusterOutputs` maps.
pub fn migrate(mut doc: serde_json::Value) -> std::result::Result<serde_json::Value, String> {
    let obj = doc
        .as_object_mut()
        .ok_or_else(|| "top-level value is not an object".to_string())?;

    let version = match obj.get("version") {
        None => 0,
        Some(v) => v
            .as_u64()
            .ok_or_else(|| format!("version must be an integer, got {}", v))?,
    };

    if version > u64::from(STATE_VERSION) {
        return Err(format!(
            "written by a newer schema (version {}, supported {})",
            version, STATE_VERSION
        ));
    }

    if version == 0 {
        let mut outputs = serde_json::Map::new();
        for (legacy, key) in [
            ("bootstrapOutputs", "bootstrap"),
            ("foundationOutputs", "foundation"),
            ("clusterOutputs", "cluster"),
        ] {
            if let Some(value) = obj.remove(legacy) {
                outputs.insert(key.to_string(), value);
            }
        }
        obj.insert("outputs".to_string(), serde_json::Value::Object(outputs));
        obj.insert("version".to_string(), serde_json::json!(STATE_VERSION));
    }

    Ok(doc)
}
