//! Application manifest: the declarative description of one deployable app.

mod source;
mod validate;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

pub use source::{HttpManifestSource, ManifestSource, load_manifest, manifest_urls};
pub use validate::{is_valid_quantity, validate_manifest};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Manifest {
    /// Repository reference without tag; the request version is appended.
    pub image: String,
    pub port: i32,
    pub healthcheck: Healthcheck,
    pub pre_stop_hook_path: Option<String>,
    pub prometheus: PrometheusConfig,
    pub istio: IstioConfig,
    pub replicas: Replicas,
    pub ingress: IngressConfig,
    pub resources: ResourceRequirements,
    pub dependencies: Dependencies,
    pub leader_election: bool,
    pub redis: bool,
    pub vault: VaultSettings,
    pub alerts: Vec<AlertRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthEndpoint {
    pub path: String,
    pub initial_delay: i32,
    pub period_seconds: i32,
    pub failure_threshold: i32,
    pub timeout: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Healthcheck {
    pub liveness: HealthEndpoint,
    pub readiness: HealthEndpoint,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrometheusConfig {
    pub enabled: bool,
    pub port: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IstioConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Replicas {
    pub min: i32,
    pub max: i32,
    pub cpu_threshold_percentage: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressConfig {
    pub disabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceList {
    pub cpu: String,
    pub memory: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceRequirements {
    pub limits: ResourceList,
    pub requests: ResourceList,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dependencies {
    pub used: Vec<UsedResource>,
    pub exposed: Vec<ExposedResource>,
}

/// A registry resource the application consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsedResource {
    pub alias: String,
    pub resource_type: String,
    /// Property key → environment variable name, used verbatim.
    pub property_map: BTreeMap<String, String>,
}

/// An endpoint the application publishes to the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExposedResource {
    pub alias: String,
    pub resource_type: String,
    pub path: String,
    pub description: String,
    pub wsdl_group_id: String,
    pub wsdl_artifact_id: String,
    pub wsdl_version: String,
    pub all_zones: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultSettings {
    /// Also run the secret fetcher as a long-lived sidecar.
    pub sidecar: bool,
}

/// Prometheus alerting rule, written verbatim into the rule group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertRule {
    pub alert: String,
    pub expr: String,
    #[serde(rename = "for")]
    pub for_: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Manifest {
    /// Values used for every field the fetched document leaves out.
    pub fn defaults_for(application: &str, image_registry: &str) -> Self {
        let endpoint = |path: &str| HealthEndpoint {
            path: path.to_string(),
            initial_delay: 20,
            period_seconds: 10,
            failure_threshold: 3,
            timeout: 1,
        };
        Manifest {
            image: format!(
                "{}/{}",
                image_registry.trim_end_matches('/'),
                application
            ),
            port: 8080,
            healthcheck: Healthcheck {
                liveness: endpoint("/isAlive"),
                readiness: endpoint("/isReady"),
            },
            prometheus: PrometheusConfig {
                enabled: false,
                port: "http".into(),
                path: "/metrics".into(),
            },
            replicas: Replicas {
                min: 2,
                max: 4,
                cpu_threshold_percentage: 50,
            },
            resources: ResourceRequirements {
                limits: ResourceList {
                    cpu: "500m".into(),
                    memory: "512Mi".into(),
                },
                requests: ResourceList {
                    cpu: "200m".into(),
                    memory: "256Mi".into(),
                },
            },
            ..Default::default()
        }
    }

    /// Parses `document` and lays it over the defaults for `application`.
    pub fn from_yaml_with_defaults(
        document: &str,
        application: &str,
        image_registry: &str,
    ) -> Result<Self, serde_yaml::Error> {
        let fetched: Value = serde_yaml::from_str(document)?;
        let mut merged =
            serde_yaml::to_value(Self::defaults_for(application, image_registry))?;
        merge_values(&mut merged, fetched);
        serde_yaml::from_value(merged)
    }
}

/// Recursively overlays `overlay` onto `base`. Mappings merge key by key,
/// nulls keep the base value, everything else replaces it.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (k, v) in overlay_map {
                match base_map.get_mut(&k) {
                    Some(existing) => merge_values(existing, v),
                    None => {
                        base_map.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetched_fields_override_defaults_and_the_rest_fall_back() {
        let doc = r#"
image: registry.local/team/app
replicas:
  max: 6
healthcheck:
  liveness:
    path: /internal/alive
dependencies:
  used:
    - alias: db
      resourceType: datasource
      propertyMap:
        url: DB_URL
"#;
        let m = Manifest::from_yaml_with_defaults(doc, "app", "docker.io").unwrap();
        assert_eq!(m.image, "registry.local/team/app");
        assert_eq!(m.replicas.min, 2);
        assert_eq!(m.replicas.max, 6);
        assert_eq!(m.replicas.cpu_threshold_percentage, 50);
        assert_eq!(m.healthcheck.liveness.path, "/internal/alive");
        assert_eq!(m.healthcheck.liveness.initial_delay, 20);
        assert_eq!(m.healthcheck.readiness.path, "/isReady");
        assert_eq!(m.resources.limits.memory, "512Mi");
        assert_eq!(m.port, 8080);
        assert_eq!(m.dependencies.used[0].property_map["url"], "DB_URL");
    }

    #[test]
    fn empty_document_yields_defaults() {
        let m = Manifest::from_yaml_with_defaults("", "app", "docker.io/").unwrap();
        assert_eq!(m, Manifest::defaults_for("app", "docker.io"));
        assert_eq!(m.image, "docker.io/app");
    }

    #[test]
    fn alert_rules_keep_for_key() {
        let doc = r#"
alerts:
  - alert: AppDown
    expr: up == 0
    for: 5m
    annotations:
      action: page someone
"#;
        let m = Manifest::from_yaml_with_defaults(doc, "app", "r").unwrap();
        assert_eq!(m.alerts[0].for_, "5m");
        let v = serde_yaml::to_value(&m.alerts[0]).unwrap();
        assert_eq!(v["for"], Value::from("5m"));
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(Manifest::from_yaml_with_defaults("replicas: [", "app", "r").is_err());
        assert!(Manifest::from_yaml_with_defaults("port: eighty", "app", "r").is_err());
    }
}
