//! Lab configuration loaded from `lakelab.yaml`
//!
//! Resolution order for the file (highest priority first):
//! 1. Explicit `--config` flag
//! 2. `LAKELAB_CONFIG` environment variable
//! 3. `./lakelab.yaml`
//!
//! Relative module directories and values files are resolved against the
//! directory containing the config file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{default_components, default_essentials, EssentialRelease};
use crate::graph::{ComponentSpec, DependencyResolver};
use crate::{Error, Result};

const DEFAULT_CONFIG_FILE: &str = "lakelab.yaml";
const CONFIG_ENV: &str = "LAKELAB_CONFIG";
const REGION_ENV: &str = "LAKELAB_REGION";
const AWS_REGION_ENV: &str = "AWS_REGION";
const STATE_DIR_NAME: &str = ".lakelab";
const MAX_LAB_NAME_LEN: usize = 32;

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Provisioner module directories
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleDirs {
    /// State backend (bucket + lock table), applied with local state
    pub state_backend: PathBuf,
    /// Network, database, object storage, policies
    pub foundation: PathBuf,
    /// Compute cluster
    pub cluster: PathBuf,
}

impl Default for ModuleDirs {
    fn default() -> Self {
        Self {
            state_backend: PathBuf::from("infra/state-backend"),
            foundation: PathBuf::from("infra/foundation"),
            cluster: PathBuf::from("infra/cluster"),
        }
    }
}

/// Where the database credential comes from and where it goes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CredentialSecret {
    /// Foundation output holding the secret-store reference
    pub output_key: String,
    /// Kubernetes secret created in every component namespace
    pub name: String,
}

impl Default for CredentialSecret {
    fn default() -> Self {
        Self {
            output_key: "db_credentials_secret_arn".to_string(),
            name: "lakehouse-db-credentials".to_string(),
        }
    }
}

/// Polling and install bounds, in seconds
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timeouts {
    /// Cluster reaching ACTIVE
    pub cluster_active_secs: u64,
    /// All nodes reporting Ready
    pub node_ready_secs: u64,
    /// Component pods running
    pub component_ready_secs: u64,
    /// Namespaces disappearing during teardown
    pub namespace_drain_secs: u64,
    /// Sleep between readiness checks
    pub poll_interval_secs: u64,
    /// `--timeout` passed to the deployment executor
    pub install_timeout_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            cluster_active_secs: 1800,
            node_ready_secs: 600,
            component_ready_secs: 600,
            namespace_drain_secs: 180,
            poll_interval_secs: 10,
            install_timeout_secs: 600,
        }
    }
}

impl Timeouts {
    /// Cluster-active bound
    pub fn cluster_active(&self) -> Duration {
        Duration::from_secs(self.cluster_active_secs)
    }

    /// Node-ready bound
    pub fn node_ready(&self) -> Duration {
        Duration::from_secs(self.node_ready_secs)
    }

    /// Component-ready bound
    pub fn component_ready(&self) -> Duration {
        Duration::from_secs(self.component_ready_secs)
    }

    /// Namespace drain bound
    pub fn namespace_drain(&self) -> Duration {
        Duration::from_secs(self.namespace_drain_secs)
    }

    /// Poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Install timeout
    pub fn install(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }
}

/// Everything the orchestrator needs to know about one lab
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabConfig {
    /// Lab name; keys the state file and prefixes cloud resources
    pub lab: String,
    /// Cloud region
    #[serde(default = "default_region")]
    pub region: String,
    /// Directory holding state files; `~/.lakelab/state` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    /// Provisioner module directories
    #[serde(default)]
    pub modules: ModuleDirs,
    /// Extra variables merged into every module's variable map
    #[serde(default)]
    pub variables: BTreeMap<String, serde_json::Value>,
    /// Database credential wiring
    #[serde(default)]
    pub credential_secret: CredentialSecret,
    /// Cluster-essential releases; built-in defaults when absent
    #[serde(default = "default_essentials")]
    pub essentials: Vec<EssentialRelease>,
    /// Overrides or additions to the built-in component catalog, matched by name
    #[serde(default)]
    pub components: Vec<ComponentSpec>,
    /// Polling and install bounds
    #[serde(default)]
    pub timeouts: Timeouts,
}

impl LabConfig {
    /// Minimal config for a lab, everything else defaulted
    pub fn new(lab: impl Into<String>) -> Self {
        Self {
            lab: lab.into(),
            region: default_region(),
            state_dir: None,
            modules: ModuleDirs::default(),
            variables: BTreeMap::new(),
            credential_secret: CredentialSecret::default(),
            essentials: default_essentials(),
            components: Vec::new(),
            timeouts: Timeouts::default(),
        }
    }

    /// Load from the resolved config path and apply environment overrides
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(explicit);
        let data = std::fs::read_to_string(&path).map_err(|e| {
            Error::config(format!(
                "failed to read {}: {} (pass --config or set {})",
                path.display(),
                e,
                CONFIG_ENV
            ))
        })?;

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut config = Self::from_yaml(&data, &base_dir)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;

        debug!(lab = %config.lab, region = %config.region, path = %path.display(), "loaded lab config");
        Ok(config)
    }

    /// Parse YAML, resolving relative paths against `base_dir`
    pub fn from_yaml(data: &str, base_dir: &Path) -> Result<Self> {
        let mut config: LabConfig = serde_yaml::from_str(data)
            .map_err(|e| Error::config(format!("invalid lab config: {}", e)))?;
        config.resolve_paths(base_dir);
        Ok(config)
    }

    /// Apply region overrides from the environment (`LAKELAB_REGION`, then `AWS_REGION`)
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for key in [REGION_ENV, AWS_REGION_ENV] {
            if let Some(region) = lookup(key).filter(|r| !r.is_empty()) {
                debug!(source = key, region = %region, "region overridden from environment");
                self.region = region;
                return;
            }
        }
    }

    /// Check the lab name and the component graph
    pub fn validate(&self) -> Result<()> {
        if self.lab.is_empty() {
            return Err(Error::config("lab name must not be empty"));
        }
        if self.lab.len() > MAX_LAB_NAME_LEN {
            return Err(Error::config(format!(
                "lab name '{}' exceeds {} characters",
                self.lab, MAX_LAB_NAME_LEN
            )));
        }
        let valid = self
            .lab
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid || self.lab.starts_with('-') || self.lab.ends_with('-') {
            return Err(Error::config(format!(
                "lab name '{}' must be lowercase alphanumeric with inner dashes",
                self.lab
            )));
        }
        if self.region.is_empty() {
            return Err(Error::config("region must not be empty"));
        }
        if self.timeouts.poll_interval_secs == 0 {
            return Err(Error::config("timeouts.pollIntervalSecs must be at least 1"));
        }
        self.resolver()?;
        Ok(())
    }

    /// State directory, defaulting to `~/.lakelab/state`
    pub fn state_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }
        let home = dirs::home_dir()
            .ok_or_else(|| Error::config("could not determine home directory; set stateDir"))?;
        Ok(home.join(STATE_DIR_NAME).join("state"))
    }

    /// Kubeconfig written for this lab's cluster
    pub fn kubeconfig_path(&self) -> Result<PathBuf> {
        Ok(self.state_dir()?.join(format!("{}.kubeconfig", self.lab)))
    }

    /// Built-in catalog with this config's overrides applied
    pub fn component_specs(&self) -> Vec<ComponentSpec> {
        let mut specs: BTreeMap<String, ComponentSpec> = default_components()
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect();
        for spec in &self.components {
            specs.insert(spec.name.clone(), spec.clone());
        }
        specs.into_values().collect()
    }

    /// Dependency resolver over [`component_specs`](Self::component_specs)
    pub fn resolver(&self) -> Result<DependencyResolver> {
        DependencyResolver::new(self.component_specs())
    }

    fn resolve_paths(&mut self, base_dir: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base_dir.join(&*p);
            }
        };
        join(&mut self.modules.state_backend);
        join(&mut self.modules.foundation);
        join(&mut self.modules.cluster);
        if let Some(dir) = self.state_dir.as_mut() {
            join(dir);
        }
        for essential in &mut self.essentials {
            if let Some(values) = essential.values_file.as_mut() {
                join(values);
            }
        }
        for component in &mut self.components {
            if let Some(values) = component.values_file.as_mut() {
                join(values);
            }
        }
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    PathBuf::from(DEFAULT_CONFIG_FILE)
}
