//! Desired-state builders, one per cluster object kind.
//!
//! Every builder is a pure function of the current object (if any) and the
//! [`BuildContext`]. Cluster-assigned fields of the current object are carried
//! over; everything else is recomputed.

mod alerts;
mod autoscaler;
mod ingress;
mod rbac;
mod secret;
mod service;
mod workload;

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::config::DeploydConfig;
use crate::env::EnvPlan;
use crate::manifest::Manifest;
use crate::registry::ResolvedResource;
use crate::request::DeploymentRequest;
use crate::vault::VaultInjector;

pub use alerts::{ALERT_RULES_CONFIGMAP, alert_rules_key, build_alert_rules};
pub use autoscaler::build_autoscaler;
pub use ingress::{build_ingress, sbs_public_host};
pub use rbac::{build_role_binding, build_service_account};
pub use secret::build_secret;
pub use service::build_service;
pub use workload::build_deployment;

/// Port the Service exposes and the Ingress routes to.
pub const SERVICE_PORT: i32 = 80;

/// Name of the container port every health check and the Service target.
pub const HTTP_PORT_NAME: &str = "http";

/// Inputs shared by every builder for one deploy.
#[derive(Clone, Copy)]
pub struct BuildContext<'a> {
    pub req: &'a DeploymentRequest,
    pub manifest: &'a Manifest,
    pub resources: &'a [ResolvedResource],
    pub env: &'a EnvPlan,
    pub cfg: &'a DeploydConfig,
    pub vault: Option<&'a VaultInjector>,
}

impl BuildContext<'_> {
    /// Every application-owned object is named after the application.
    pub fn name(&self) -> &str {
        &self.req.application
    }

    pub fn namespace(&self) -> &str {
        &self.req.namespace
    }

    /// Selector and object labels of the application.
    pub fn labels(&self) -> BTreeMap<String, String> {
        app_labels(&self.req.application)
    }
}

pub fn app_labels(app: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), app.to_string())])
}

/// `{app}.{subdomain}` in the default namespace, `{app}-{ns}.{subdomain}`
/// everywhere else.
pub fn default_ingress_host(app: &str, namespace: &str, subdomain: &str) -> String {
    if namespace == "default" {
        format!("{app}.{subdomain}")
    } else {
        format!("{app}-{namespace}.{subdomain}")
    }
}

/// Metadata for an object named after the application.
///
/// The current metadata is the starting point so the resource version, uid
/// and annotations written by other controllers survive the update; name,
/// namespace and our labels are then forced.
pub(crate) fn object_meta(
    current: Option<&ObjectMeta>,
    name: &str,
    namespace: &str,
    labels: BTreeMap<String, String>,
) -> ObjectMeta {
    let mut meta = current.cloned().unwrap_or_default();
    meta.name = Some(name.to_string());
    meta.namespace = Some(namespace.to_string());
    meta.managed_fields = None;
    meta.labels.get_or_insert_with(BTreeMap::new).extend(labels);
    meta
}
