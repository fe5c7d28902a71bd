//! Built-in lakehouse component set and cluster essentials

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::graph::ComponentSpec;

/// Identity provider
pub const KEYCLOAK: &str = "keycloak";
/// Iceberg REST catalog
pub const POLARIS: &str = "polaris";
/// Query engine
pub const TRINO: &str = "trino";
/// Policy engine add-on
pub const OPA: &str = "opa";

/// Default component catalog.
///
/// polaris authenticates against keycloak, trino reads tables through
/// polaris and enforces access through opa when present.
pub fn default_components() -> Vec<ComponentSpec> {
    vec![
        ComponentSpec::new(KEYCLOAK, "oci://registry-1.docker.io/bitnamicharts/keycloak", KEYCLOAK),
        ComponentSpec::new(POLARIS, "polaris/polaris", POLARIS).hard(KEYCLOAK),
        ComponentSpec::new(TRINO, "trino/trino", TRINO)
            .hard(POLARIS)
            .soft(OPA),
        ComponentSpec::new(OPA, "opa/opa-kube-mgmt", OPA).optional(),
    ]
}

/// A release installed once per cluster before any component
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EssentialRelease {
    /// Release name
    pub name: String,
    /// Chart reference
    pub chart: String,
    /// Target namespace
    pub namespace: String,
    /// Pinned chart version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Values file applied on install
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values_file: Option<PathBuf>,
}

/// Essentials installed when the config names none
pub fn default_essentials() -> Vec<EssentialRelease> {
    vec![EssentialRelease {
        name: "metrics-server".to_string(),
        chart: "metrics-server/metrics-server".to_string(),
        namespace: "kube-system".to_string(),
        version: None,
        values_file: None,
    }]
}
