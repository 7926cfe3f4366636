//! JSON shapes exchanged with the dependency registry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Answer of `GET /api/v2/scopedresource`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryResource {
    pub id: i64,
    pub alias: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub properties: BTreeMap<String, String>,
    /// Secret name → reference URL holding the value.
    pub secrets: BTreeMap<String, SecretRef>,
    /// File descriptors, e.g. `keystore: {filename, ref}`.
    pub files: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SecretRef {
    #[serde(rename = "ref")]
    pub reference: String,
}

/// One element of `GET /api/v2/resources?type=LoadBalancerConfig`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadBalancerEntry {
    pub properties: LoadBalancerProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadBalancerProperties {
    pub url: Option<String>,
    pub context_roots: Option<String>,
}

/// Body of resource create/update calls for exposed endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourcePayload {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub alias: String,
    pub properties: PayloadProperties,
    pub scope: PayloadScope,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wsdl_url: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayloadScope {
    pub environment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationInstancePayload {
    pub application: String,
    pub environment: String,
    pub version: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exposed_resources: Vec<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub used_resources: Vec<i64>,
}
