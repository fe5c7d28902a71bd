//! Component dependency graph
//!
//! Computes deploy order (Kahn's algorithm, grouped by dependency depth so
//! siblings with satisfied prerequisites share a batch) and undeploy order
//! (leaves first, a component only after everything that hard-depends on it
//! is gone).

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Set of component names eligible for the same deploy/undeploy step
pub type Batch = BTreeSet<String>;

/// Static description of a deployable component
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Component name (key in the lab state)
    pub name: String,
    /// Components that must be deployed first
    #[serde(default)]
    pub hard_dependencies: BTreeSet<String>,
    /// Components whose absence only warrants a warning
    #[serde(default)]
    pub soft_dependencies: BTreeSet<String>,
    /// Chart reference passed to the deployment executor
    pub chart: String,
    /// Target namespace
    pub namespace: String,
    /// Release name; defaults to the component name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    /// Pinned chart version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Values file applied on install
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values_file: Option<PathBuf>,
    /// Deployed when `up` names no components and `--all` is absent
    #[serde(default = "default_true")]
    pub default: bool,
}

fn default_true() -> bool {
    true
}

impl ComponentSpec {
    /// Create a spec with no dependencies
    pub fn new(name: impl Into<String>, chart: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hard_dependencies: BTreeSet::new(),
            soft_dependencies: BTreeSet::new(),
            chart: chart.into(),
            namespace: namespace.into(),
            release: None,
            version: None,
            values_file: None,
            default: true,
        }
    }

    /// Add a hard dependency
    pub fn hard(mut self, dep: impl Into<String>) -> Self {
        self.hard_dependencies.insert(dep.into());
        self
    }

    /// Add a soft dependency
    pub fn soft(mut self, dep: impl Into<String>) -> Self {
        self.soft_dependencies.insert(dep.into());
        self
    }

    /// Mark as an optional add-on (not part of the default set)
    pub fn optional(mut self) -> Self {
        self.default = false;
        self
    }

    /// Release name used with the deployment executor
    pub fn release_name(&self) -> &str {
        self.release.as_deref().unwrap_or(&self.name)
    }
}

/// What to do when a component fails to deploy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Something hard-depends on this component: abort the command
    Abort,
    /// Optional add-on: record the failure and keep going
    Continue,
}

/// A soft dependency that is neither deployed nor requested
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoftDependencyWarning {
    /// Component being deployed
    pub component: String,
    /// Missing soft dependency
    pub missing: String,
}

/// Ordered deployment plan for a request
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeployPlan {
    /// Batches in deployment order
    pub batches: Vec<Batch>,
    /// Missing soft dependencies to surface
    pub warnings: Vec<SoftDependencyWarning>,
}

impl DeployPlan {
    /// All components in the plan, in order
    pub fn components(&self) -> impl Iterator<Item = &String> {
        self.batches.iter().flat_map(|b| b.iter())
    }
}

/// Holds the component graph and computes orderings
#[derive(Clone, Debug)]
pub struct DependencyResolver {
    specs: BTreeMap<String, ComponentSpec>,
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyResolver {
    /// Build the graph, rejecting unknown dependency names and cycles
    pub fn new(specs: impl IntoIterator<Item = ComponentSpec>) -> Result<Self> {
        let specs: BTreeMap<String, ComponentSpec> =
            specs.into_iter().map(|s| (s.name.clone(), s)).collect();

        let mut dependents: BTreeMap<String, BTreeSet<String>> = specs
            .keys()
            .map(|name| (name.clone(), BTreeSet::new()))
            .collect();

        for spec in specs.values() {
            for dep in spec.hard_dependencies.iter().chain(&spec.soft_dependencies) {
                if !specs.contains_key(dep) {
                    return Err(Error::UnknownComponent { name: dep.clone() });
                }
            }
            for dep in &spec.hard_dependencies {
                if let Some(set) = dependents.get_mut(dep) {
                    set.insert(spec.name.clone());
                }
            }
        }

        let resolver = Self { specs, dependents };
        let all: BTreeSet<String> = resolver.specs.keys().cloned().collect();
        resolver.layer(&all)?;
        Ok(resolver)
    }

    /// Look up a component spec
    pub fn spec(&self, name: &str) -> Option<&ComponentSpec> {
        self.specs.get(name)
    }

    /// All component specs in name order
    pub fn specs(&self) -> impl Iterator<Item = &ComponentSpec> {
        self.specs.values()
    }

    /// All component names
    pub fn names(&self) -> BTreeSet<String> {
        self.specs.keys().cloned().collect()
    }

    /// Components deployed when nothing is named explicitly
    pub fn default_set(&self) -> BTreeSet<String> {
        self.specs
            .values()
            .filter(|s| s.default)
            .map(|s| s.name.clone())
            .collect()
    }

    /// Components that hard-depend on `name`
    pub fn dependents(&self, name: &str) -> BTreeSet<String> {
        self.dependents.get(name).cloned().unwrap_or_default()
    }

    /// Failure policy of a component, derived from the graph
    pub fn failure_policy(&self, name: &str) -> FailurePolicy {
        if self.dependents(name).is_empty() {
            FailurePolicy::Continue
        } else {
            FailurePolicy::Abort
        }
    }

    /// Validate a request and compute its batches.
    ///
    /// `deployed` is what the lab state already records as deployed; those
    /// satisfy hard dependencies without being part of the plan. A missing
    /// hard dependency rejects the whole request before anything runs.
    pub fn resolve(&self, requested: &BTreeSet<String>, deployed: &BTreeSet<String>) -> Result<DeployPlan> {
        for name in requested {
            if !self.specs.contains_key(name) {
                return Err(Error::UnknownComponent { name: name.clone() });
            }
        }

        let mut warnings = Vec::new();
        for name in requested {
            let spec = &self.specs[name];
            for dep in &spec.hard_dependencies {
                if !requested.contains(dep) && !deployed.contains(dep) {
                    return Err(Error::UnmetHardDependency {
                        component: name.clone(),
                        missing: dep.clone(),
                    });
                }
            }
            for dep in &spec.soft_dependencies {
                if !requested.contains(dep) && !deployed.contains(dep) {
                    warnings.push(SoftDependencyWarning {
                        component: name.clone(),
                        missing: dep.clone(),
                    });
                }
            }
        }

        let batches = self.layer(requested)?;
        debug!(batches = batches.len(), components = requested.len(), "computed deploy order");
        Ok(DeployPlan { batches, warnings })
    }

    /// Batches for deploying `requested`, given what is already deployed
    pub fn deploy_order(&self, requested: &BTreeSet<String>, deployed: &BTreeSet<String>) -> Result<Vec<Batch>> {
        Ok(self.resolve(requested, deployed)?.batches)
    }

    /// Batches for tearing down `deployed`.
    ///
    /// The first batch holds every component nobody else in the set
    /// hard-depends on. Names unknown to the catalog have no edges and
    /// therefore land in the first batch.
    pub fn undeploy_order(&self, deployed: &BTreeSet<String>) -> Vec<Batch> {
        let mut remaining = deployed.clone();
        let mut batches = Vec::new();

        while !remaining.is_empty() {
            let batch: Batch = remaining
                .iter()
                .filter(|name| {
                    !remaining.iter().any(|other| {
                        self.specs
                            .get(other)
                            .map(|s| s.hard_dependencies.contains(*name))
                            .unwrap_or(false)
                    })
                })
                .cloned()
                .collect();

            // The graph is acyclic, so every round removes at least one name
            if batch.is_empty() {
                batches.push(std::mem::take(&mut remaining));
                break;
            }

            for name in &batch {
                remaining.remove(name);
            }
            batches.push(batch);
        }

        batches
    }

    /// Kahn layering over hard dependencies restricted to `nodes`.
    ///
    /// Dependencies outside `nodes` are already deployed (checked by the
    /// caller) and impose no ordering.
    fn layer(&self, nodes: &BTreeSet<String>) -> Result<Vec<Batch>> {
        let mut placed: BTreeSet<String> = BTreeSet::new();
        let mut batches = Vec::new();

        while placed.len() < nodes.len() {
            let batch: Batch = nodes
                .iter()
                .filter(|name| !placed.contains(*name))
                .filter(|name| {
                    self.specs[*name]
                        .hard_dependencies
                        .iter()
                        .all(|dep| placed.contains(dep) || !nodes.contains(dep))
                })
                .cloned()
                .collect();

            if batch.is_empty() {
                let stuck: Vec<String> = nodes
                    .iter()
                    .filter(|name| !placed.contains(*name))
                    .cloned()
                    .collect();
                return Err(Error::DependencyCycle { components: stuck });
            }

            placed.extend(batch.iter().cloned());
            batches.push(batch);
        }

        Ok(batches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lakehouse() -> DependencyResolver {
        DependencyResolver::new([
            ComponentSpec::new("keycloak", "bitnami/keycloak", "identity"),
            ComponentSpec::new("polaris", "polaris/polaris", "catalog").hard("keycloak"),
            ComponentSpec::new("trino", "trino/trino", "query")
                .hard("polaris")
                .soft("opa"),
            ComponentSpec::new("opa", "opa/opa-kube-mgmt", "policy").optional(),
        ])
        .unwrap()
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn deploy_order_batches_by_depth() {
        let resolver = lakehouse();
        let batches = resolver
            .deploy_order(&set(&["keycloak", "polaris", "trino", "opa"]), &set(&[]))
            .unwrap();
        assert_eq!(
            batches,
            vec![set(&["keycloak", "opa"]), set(&["polaris"]), set(&["trino"])]
        );
    }

    #[test]
    fn lone_trino_is_rejected_before_anything_runs() {
        let resolver = lakehouse();
        let err = resolver.deploy_order(&set(&["trino"]), &set(&[])).unwrap_err();
        match err {
            Error::UnmetHardDependency { component, missing } => {
                assert_eq!(component, "trino");
                assert_eq!(missing, "polaris");
            }
            other => panic!("expected UnmetHardDependency, got {:?}", other),
        }
    }

    #[test]
    fn deployed_dependencies_satisfy_request() {
        let resolver = lakehouse();
        let plan = resolver
            .resolve(&set(&["trino"]), &set(&["keycloak", "polaris"]))
            .unwrap();
        assert_eq!(plan.batches, vec![set(&["trino"])]);
        assert_eq!(
            plan.warnings,
            vec![SoftDependencyWarning {
                component: "trino".to_string(),
                missing: "opa".to_string(),
            }]
        );
    }

    #[test]
    fn soft_dependency_in_request_produces_no_warning() {
        let resolver = lakehouse();
        let plan = resolver
            .resolve(&set(&["keycloak", "polaris", "trino", "opa"]), &set(&[]))
            .unwrap();
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn undeploy_order_tears_down_leaves_first() {
        let resolver = lakehouse();
        let batches = resolver.undeploy_order(&set(&["keycloak", "polaris", "trino", "opa"]));
        assert_eq!(
            batches,
            vec![set(&["opa", "trino"]), set(&["polaris"]), set(&["keycloak"])]
        );
    }

    #[test]
    fn undeploy_order_handles_partial_and_unknown_sets() {
        let resolver = lakehouse();
        let batches = resolver.undeploy_order(&set(&["keycloak", "trino", "legacy-addon"]));
        // trino's prerequisite polaris is gone, so keycloak has no remaining dependents
        assert_eq!(batches, vec![set(&["keycloak", "legacy-addon", "trino"])]);
    }

    #[test]
    fn failure_policy_follows_graph() {
        let resolver = lakehouse();
        assert_eq!(resolver.failure_policy("keycloak"), FailurePolicy::Abort);
        assert_eq!(resolver.failure_policy("polaris"), FailurePolicy::Abort);
        assert_eq!(resolver.failure_policy("trino"), FailurePolicy::Continue);
        assert_eq!(resolver.failure_policy("opa"), FailurePolicy::Continue);
    }

    #[test]
    fn dependents_are_reverse_of_hard_dependencies() {
        let resolver = lakehouse();
        assert_eq!(resolver.dependents("keycloak"), set(&["polaris"]));
        assert_eq!(resolver.dependents("opa"), set(&[]));
    }

    #[test]
    fn default_set_excludes_optional_addons() {
        assert_eq!(lakehouse().default_set(), set(&["keycloak", "polaris", "trino"]));
    }

    #[test]
    fn unknown_requested_component_is_rejected() {
        let err = lakehouse().deploy_order(&set(&["spark"]), &set(&[])).unwrap_err();
        assert!(matches!(err, Error::UnknownComponent { name } if name == "spark"));
    }

    #[test]
    fn unknown_dependency_is_rejected_at_construction() {
        let err = DependencyResolver::new([ComponentSpec::new("a", "c/a", "a").hard("ghost")])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownComponent { name } if name == "ghost"));
    }

    #[test]
    fn cycle_is_rejected_at_construction() {
        let err = DependencyResolver::new([
            ComponentSpec::new("a", "c/a", "a").hard("b"),
            ComponentSpec::new("b", "c/b", "b").hard("a"),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::DependencyCycle { components } if components.len() == 2));
    }

    #[test]
    fn release_name_defaults_to_component_name() {
        let mut spec = ComponentSpec::new("trino", "trino/trino", "query");
        assert_eq!(spec.release_name(), "trino");
        spec.release = Some("lake-trino".to_string());
        assert_eq!(spec.release_name(), "lake-trino");
    }
}
