use std::collections::BTreeMap;

use tracing::{info, instrument, warn};

use super::wire::{
    ApplicationInstancePayload, PayloadProperties, PayloadScope, RegistryResource,
    ResourcePayload,
};
use super::{
    Credentials, LOAD_BALANCER_CONFIG, Registry, ResolvedResource, Scope, ScopedQuery,
};
use crate::config::DeploydConfig;
use crate::errors::{DeployError, RegistryError, ValidationError, ValidationErrors};
use crate::manifest::{ExposedResource, Manifest, UsedResource};
use crate::request::DeploymentRequest;

/// Synthetic property holding a newline-delimited `key=value` block.
const APPLICATION_PROPERTIES_KEY: &str = "applicationProperties";

/// Ids reported to the registry after a successful apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySync {
    pub exposed_ids: Vec<i64>,
    pub used_ids: Vec<i64>,
}

fn credentials(req: &DeploymentRequest) -> Credentials {
    Credentials {
        username: req.username.clone(),
        password: req.password.clone(),
    }
}

fn query<'a>(alias: &'a str, resource_type: &'a str, req: &'a DeploymentRequest) -> ScopedQuery<'a> {
    ScopedQuery {
        alias,
        resource_type,
        environment: &req.environment,
        application: &req.application,
        zone: &req.zone,
    }
}

/// Environment and application must be known to the registry before
/// anything is resolved against them.
pub async fn precheck(registry: &dyn Registry, req: &DeploymentRequest) -> Result<(), DeployError> {
    let creds = credentials(req);
    let mut errs = ValidationErrors::default();
    match registry.get_environment(&req.environment, &creds).await {
        Ok(()) => {}
        Err(RegistryError::NotFound) => errs.push(
            ValidationError::new("environment does not exist in registry")
                .field("environment", &req.environment),
        ),
        Err(e) => return Err(DeployError::registry("checking environment", e)),
    }
    match registry.get_application(&req.application, &creds).await {
        Ok(()) => {}
        Err(RegistryError::NotFound) => errs.push(
            ValidationError::new("application does not exist in registry")
                .field("application", &req.application),
        ),
        Err(e) => return Err(DeployError::registry("checking application", e)),
    }
    errs.into_result().map_err(DeployError::from)
}

/// Resolves each used resource in declaration order. The first failure
/// aborts the batch and names the alias/type being resolved.
#[instrument(skip_all, fields(app = %req.application, env = %req.environment))]
pub async fn resolve_used(
    registry: &dyn Registry,
    used: &[UsedResource],
    req: &DeploymentRequest,
) -> Result<Vec<ResolvedResource>, DeployError> {
    let creds = credentials(req);
    let mut out = Vec::with_capacity(used.len());
    for u in used {
        let raw = registry
            .get_scoped_resource(query(&u.alias, &u.resource_type, req), &creds)
            .await
            .map_err(|e| match e {
                RegistryError::NotFound => DeployError::DependencyNotFound {
                    alias: u.alias.clone(),
                    resource_type: u.resource_type.clone(),
                },
                other => DeployError::registry(
                    format!("resolving {} ({})", u.alias, u.resource_type),
                    other,
                ),
            })?;
        let resolved = into_resolved(registry, raw, u, req, &creds).await?;
        info!(alias = %u.alias, resource_type = %u.resource_type, id = resolved.id, "resolved dependency");
        out.push(resolved);
    }
    Ok(out)
}

async fn into_resolved(
    registry: &dyn Registry,
    raw: RegistryResource,
    used: &UsedResource,
    req: &DeploymentRequest,
    creds: &Credentials,
) -> Result<ResolvedResource, DeployError> {
    let malformed = |reason: String| DeployError::MalformedDependency {
        alias: used.alias.clone(),
        resource_type: used.resource_type.clone(),
        reason,
    };

    let mut resolved = ResolvedResource {
        id: raw.id,
        name: if raw.alias.is_empty() { used.alias.clone() } else { raw.alias },
        resource_type: if raw.resource_type.is_empty() {
            used.resource_type.clone()
        } else {
            raw.resource_type
        },
        scope: Scope {
            environment: req.environment.clone(),
            zone: req.zone.clone(),
        },
        properties: raw.properties,
        property_map: used.property_map.clone(),
        ..Default::default()
    };

    for (name, secret) in &raw.secrets {
        let value = registry
            .fetch_secret(&secret.reference, creds)
            .await
            .map_err(|e| {
                DeployError::registry(format!("resolving secret {name} of {}", used.alias), e)
            })?;
        resolved.secrets.insert(name.clone(), value);
    }

    if resolved.is_certificate() {
        for (entry, descriptor) in &raw.files {
            let filename = descriptor.get("filename").and_then(|v| v.as_str());
            let reference = descriptor.get("ref").and_then(|v| v.as_str());
            let (Some(filename), Some(reference)) = (filename, reference) else {
                return Err(malformed(format!("file {entry} lacks filename or ref")));
            };
            let content = registry.fetch_file(reference, creds).await.map_err(|e| {
                DeployError::registry(format!("resolving file {filename} of {}", used.alias), e)
            })?;
            resolved.files.insert(filename.to_string(), content);
        }
    }

    if resolved.is_application_properties() {
        if let Some(block) = resolved.properties.remove(APPLICATION_PROPERTIES_KEY) {
            let exploded = explode_properties(&block).map_err(malformed)?;
            resolved.properties.extend(exploded);
        }
    }

    resolved.check_shape().map_err(malformed)?;
    Ok(resolved)
}

/// Splits a `key=value` block on line breaks and the first `=`. Blank lines
/// are skipped; any other line without `=` is an error.
fn explode_properties(block: &str) -> Result<BTreeMap<String, String>, String> {
    let mut out = BTreeMap::new();
    for (n, line) in block.split('\n').enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let Some((k, v)) = line.split_once('=') else {
            return Err(format!("line {} has no '=': {line:?}", n + 1));
        };
        out.insert(k.to_string(), v.to_string());
    }
    Ok(out)
}

/// Load-balancer bindings for the application. Missing or unreadable config
/// only produces a warning.
pub async fn resolve_load_balancer(
    registry: &dyn Registry,
    req: &DeploymentRequest,
) -> Option<ResolvedResource> {
    let entries = match registry
        .get_load_balancer_config(&req.application, &req.environment, &credentials(req))
        .await
    {
        Ok(entries) => entries,
        Err(RegistryError::NotFound) => return None,
        Err(e) => {
            warn!(app = %req.application, env = %req.environment, error = %e, "failed getting loadbalancer config");
            return None;
        }
    };

    let mut ingresses = BTreeMap::new();
    for entry in entries {
        let Some(host) = entry.properties.url.filter(|h| !h.is_empty()) else {
            warn!(app = %req.application, "no host found for loadbalancer config");
            continue;
        };
        let path = entry.properties.context_roots.unwrap_or_default();
        ingresses.insert(host, path);
    }
    if ingresses.is_empty() {
        return None;
    }

    Some(ResolvedResource {
        resource_type: LOAD_BALANCER_CONFIG.to_string(),
        scope: Scope {
            environment: req.environment.clone(),
            zone: req.zone.clone(),
        },
        ingresses,
        ..Default::default()
    })
}

/// Used resources followed by the load-balancer config, if any.
pub async fn resolve_dependencies(
    registry: &dyn Registry,
    manifest: &Manifest,
    req: &DeploymentRequest,
) -> Result<Vec<ResolvedResource>, DeployError> {
    let mut resources = resolve_used(registry, &manifest.dependencies.used, req).await?;
    if let Some(lb) = resolve_load_balancer(registry, req).await {
        resources.push(lb);
    }
    Ok(resources)
}

/// Host the application's exposed endpoints are published under: the
/// default ingress host, or the first load-balancer host when ingress is
/// disabled.
pub fn exposed_hostname(
    manifest: &Manifest,
    resources: &[ResolvedResource],
    req: &DeploymentRequest,
    cfg: &DeploydConfig,
) -> Option<String> {
    if !manifest.ingress.disabled {
        return Some(crate::builders::default_ingress_host(
            &req.application,
            &req.namespace,
            &cfg.cluster_subdomain,
        ));
    }
    resources
        .iter()
        .flat_map(|r| r.ingresses.keys())
        .next()
        .cloned()
}

fn resource_payload(
    res: &ExposedResource,
    hostname: &str,
    req: &DeploymentRequest,
    wsdl_repository_url: &str,
) -> ResourcePayload {
    let scope = PayloadScope {
        environment: req.environment.clone(),
        zone: (!res.all_zones).then(|| req.zone.clone()),
    };
    let url = format!("https://{hostname}{}", res.path);
    if res.resource_type.eq_ignore_ascii_case("WebserviceEndpoint") {
        ResourcePayload {
            resource_type: "WebserviceEndpoint".into(),
            alias: res.alias.clone(),
            properties: PayloadProperties {
                endpoint_url: Some(url),
                wsdl_url: Some(format!(
                    "{wsdl_repository_url}?r=m2internal&g={}&a={}&v={}&e=zip",
                    res.wsdl_group_id, res.wsdl_artifact_id, res.wsdl_version
                )),
                description: res.description.clone(),
                ..Default::default()
            },
            scope,
        }
    } else {
        ResourcePayload {
            resource_type: "RestService".into(),
            alias: res.alias.clone(),
            properties: PayloadProperties {
                url: Some(url),
                description: res.description.clone(),
                ..Default::default()
            },
            scope,
        }
    }
}

/// Creates or overwrites every exposed resource. Any failure aborts the
/// batch and no ids are returned.
pub async fn publish_exposed(
    registry: &dyn Registry,
    exposed: &[ExposedResource],
    hostname: Option<&str>,
    req: &DeploymentRequest,
    cfg: &DeploydConfig,
) -> Result<Vec<i64>, DeployError> {
    if exposed.is_empty() {
        return Ok(Vec::new());
    }
    let Some(hostname) = hostname else {
        return Err(ValidationErrors {
            errors: vec![ValidationError::new(
                "unable to publish exposed resources when neither ingress nor loadbalancer is configured",
            )
            .field("ingress.disabled", true)],
        }
        .into());
    };

    let creds = credentials(req);
    let mut ids = Vec::with_capacity(exposed.len());
    for res in exposed {
        let payload = resource_payload(res, hostname, req, &cfg.registry.wsdl_repository_url);
        let context = |verb: &str| {
            format!("{verb} resource {} of type {} with path {}", res.alias, res.resource_type, res.path)
        };
        let id = match registry
            .get_scoped_resource(query(&res.alias, &res.resource_type, req), &creds)
            .await
        {
            Err(RegistryError::NotFound) => registry
                .create_resource(&payload, &creds)
                .await
                .map_err(|e| DeployError::registry(context("creating"), e))?,
            Ok(existing) => registry
                .update_resource(existing.id, &payload, &creds)
                .await
                .map_err(|e| DeployError::registry(context("updating"), e))?,
            Err(e) => return Err(DeployError::registry(context("looking up"), e)),
        };
        ids.push(id);
    }
    Ok(ids)
}

pub async fn register_instance(
    registry: &dyn Registry,
    req: &DeploymentRequest,
    sync: &RegistrySync,
) -> Result<(), DeployError> {
    let payload = ApplicationInstancePayload {
        application: req.application.clone(),
        environment: req.environment.clone(),
        version: req.version.clone(),
        exposed_resources: sync.exposed_ids.clone(),
        used_resources: sync.used_ids.clone(),
    };
    registry
        .register_application_instance(&payload, &credentials(req))
        .await
        .map_err(|e| DeployError::registry("registering application instance", e))
}

/// Publishes exposed resources, then records the application instance with
/// every exposed and used id.
#[instrument(skip_all, fields(app = %req.application, env = %req.environment))]
pub async fn sync_registry(
    registry: &dyn Registry,
    manifest: &Manifest,
    resources: &[ResolvedResource],
    req: &DeploymentRequest,
    cfg: &DeploydConfig,
) -> Result<RegistrySync, DeployError> {
    let hostname = exposed_hostname(manifest, resources, req, cfg);
    let exposed_ids = publish_exposed(
        registry,
        &manifest.dependencies.exposed,
        hostname.as_deref(),
        req,
        cfg,
    )
    .await?;
    let sync = RegistrySync {
        exposed_ids,
        used_ids: resources
            .iter()
            .filter(|r| !r.is_load_balancer_config())
            .map(|r| r.id)
            .collect(),
    };
    register_instance(registry, req, &sync).await?;
    info!(exposed = ?sync.exposed_ids, used = ?sync.used_ids, "registry updated");
    Ok(sync)
}
