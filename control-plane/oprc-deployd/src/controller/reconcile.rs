use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::RoleBinding;
use k8s_openapi::Resource;
use tracing::{debug, info, instrument};

use super::{AppliedResource, DeploymentResult, Outcome};
use crate::builders::{
    ALERT_RULES_CONFIGMAP, BuildContext, build_alert_rules, build_autoscaler,
    build_deployment, build_ingress, build_role_binding, build_secret,
    build_service, build_service_account,
};
use crate::cluster::{ClusterApi, ClusterObject, ObjectStore, object_name};
use crate::config::DeploydConfig;
use crate::env::build_env;
use crate::errors::{DeployError, ReconcileFailure};
use crate::manifest::Manifest;
use crate::registry::{Registry, ResolvedResource, sync_registry};
use crate::request::DeploymentRequest;
use crate::vault::VaultInjector;

/// Desired state of one object plus whether it already exists.
struct Planned<K> {
    namespace: String,
    exists: bool,
    desired: K,
}

/// Every object of one deploy, built before anything is written.
struct Plan {
    service_account: Planned<ServiceAccount>,
    role_binding: Planned<RoleBinding>,
    secret: Option<Planned<Secret>>,
    deployment: Planned<Deployment>,
    service: Planned<Service>,
    ingress: Option<Planned<Ingress>>,
    autoscaler: Planned<HorizontalPodAutoscaler>,
    alert_rules: Option<Planned<ConfigMap>>,
    skipped: Vec<String>,
}

/// Computes and applies the cluster objects of a deploy.
///
/// A reconcile runs in two phases. The plan phase reads the current version
/// of every object and builds its successor; nothing is written if any read
/// or build fails. The apply phase then writes in dependency order, service
/// account first, and stops at the first failure. Registry synchronisation
/// runs only after every cluster write succeeded.
pub struct Reconciler {
    cluster: Arc<dyn ClusterApi>,
    cfg: Arc<DeploydConfig>,
    vault: Option<VaultInjector>,
}

impl Reconciler {
    pub fn new(cluster: Arc<dyn ClusterApi>, cfg: Arc<DeploydConfig>) -> Result<Self, DeployError> {
        let vault = VaultInjector::from_config(&cfg.vault).map_err(DeployError::Config)?;
        Ok(Self {
            cluster,
            cfg,
            vault,
        })
    }

    pub fn cluster(&self) -> &dyn ClusterApi {
        self.cluster.as_ref()
    }

    /// Brings the cluster in line with `manifest` and, unless the request
    /// skips it, records the deploy in the registry.
    ///
    /// `resources` must already be resolved; with `skipRegistry` the caller
    /// passes none and `registry` is never touched.
    #[instrument(skip_all, fields(
        app = %req.application,
        namespace = %req.namespace,
        version = %req.version
    ))]
    pub async fn reconcile(
        &self,
        req: &DeploymentRequest,
        manifest: &Manifest,
        resources: &[ResolvedResource],
        registry: Option<&dyn Registry>,
    ) -> Result<DeploymentResult, ReconcileFailure> {
        let env = build_env(manifest, req, resources)?;
        let ctx = BuildContext {
            req,
            manifest,
            resources,
            env: &env,
            cfg: &self.cfg,
            vault: self.vault.as_ref(),
        };

        let plan = self.plan(&ctx).await?;
        let mut result = DeploymentResult {
            skipped: plan.skipped.clone(),
            ..Default::default()
        };
        if let Err(error) = self.apply(plan, &mut result).await {
            return Err(ReconcileFailure {
                applied: result,
                error,
            });
        }

        if let Some(registry) = registry.filter(|_| !req.skip_registry) {
            match sync_registry(registry, manifest, resources, req, &self.cfg).await {
                Ok(sync) => result.registry = Some(sync),
                Err(error) => {
                    return Err(ReconcileFailure {
                        applied: result,
                        error,
                    });
                }
            }
        }

        info!(
            applied = result.applied.len(),
            skipped = ?result.skipped,
            "reconciled"
        );
        Ok(result)
    }

    async fn plan(&self, ctx: &BuildContext<'_>) -> Result<Plan, DeployError> {
        let cluster = self.cluster();
        let (ns, name) = (ctx.namespace(), ctx.name());
        let mut skipped = Vec::new();

        let service_account = observe::<ServiceAccount, _, _>(cluster, ns, name, |cur| {
            Ok(build_service_account(cur, ctx))
        })
        .await?;
        let role_binding = observe::<RoleBinding, _, _>(cluster, ns, name, |cur| {
            Ok(build_role_binding(cur, ctx))
        })
        .await?;

        let secret = if ctx.env.has_secret_material() {
            Some(
                observe::<Secret, _, _>(cluster, ns, name, |cur| Ok(build_secret(cur, ctx)))
                    .await?,
            )
        } else {
            skipped.push(Secret::KIND.to_string());
            None
        };

        let deployment = observe::<Deployment, _, _>(cluster, ns, name, |cur| {
            Ok(build_deployment(cur, ctx))
        })
        .await?;
        let service = observe::<Service, _, _>(cluster, ns, name, |cur| {
            Ok(build_service(cur, ctx))
        })
        .await?;

        let ingress = if ctx.manifest.ingress.disabled {
            skipped.push(Ingress::KIND.to_string());
            None
        } else {
            Some(
                observe::<Ingress, _, _>(cluster, ns, name, |cur| Ok(build_ingress(cur, ctx)))
                    .await?,
            )
        };

        let autoscaler = observe::<HorizontalPodAutoscaler, _, _>(cluster, ns, name, |cur| {
            Ok(build_autoscaler(cur, ctx))
        })
        .await?;

        let alert_rules = if ctx.manifest.alerts.is_empty() {
            skipped.push(ConfigMap::KIND.to_string());
            None
        } else {
            Some(
                observe::<ConfigMap, _, _>(
                    cluster,
                    &ctx.cfg.alerts_namespace,
                    ALERT_RULES_CONFIGMAP,
                    |cur| build_alert_rules(cur, ctx),
                )
                .await?,
            )
        };

        debug!(?skipped, "plan built");
        Ok(Plan {
            service_account,
            role_binding,
            secret,
            deployment,
            service,
            ingress,
            autoscaler,
            alert_rules,
            skipped,
        })
    }

    async fn apply(&self, plan: Plan, result: &mut DeploymentResult) -> Result<(), DeployError> {
        let cluster = self.cluster();
        write(cluster, plan.service_account, result).await?;
        write(cluster, plan.role_binding, result).await?;
        if let Some(secret) = plan.secret {
            write(cluster, secret, result).await?;
        }
        write(cluster, plan.deployment, result).await?;
        write(cluster, plan.service, result).await?;
        if let Some(ingress) = plan.ingress {
            write(cluster, ingress, result).await?;
        }
        write(cluster, plan.autoscaler, result).await?;
        if let Some(rules) = plan.alert_rules {
            write(cluster, rules, result).await?;
        }
        Ok(())
    }
}

/// Reads the current object and builds its successor from it.
async fn observe<K, S, F>(
    store: &S,
    namespace: &str,
    name: &str,
    build: F,
) -> Result<Planned<K>, DeployError>
where
    K: ClusterObject,
    S: ObjectStore<K> + ?Sized,
    F: FnOnce(Option<&K>) -> Result<K, DeployError>,
{
    let current = store.get(namespace, name).await?;
    let desired = build(current.as_ref())?;
    Ok(Planned {
        namespace: namespace.to_string(),
        exists: current.is_some(),
        desired,
    })
}

async fn write<K, S>(
    store: &S,
    planned: Planned<K>,
    result: &mut DeploymentResult,
) -> Result<(), DeployError>
where
    K: ClusterObject,
    S: ObjectStore<K> + ?Sized,
{
    let name = object_name(&planned.desired);
    let (written, outcome) = if planned.exists {
        (
            store.update(&planned.namespace, &planned.desired).await?,
            Outcome::Updated,
        )
    } else {
        (
            store.create(&planned.namespace, &planned.desired).await?,
            Outcome::Created,
        )
    };
    info!(kind = K::KIND, %name, %outcome, "applied");
    result.applied.push(AppliedResource {
        kind: K::KIND.to_string(),
        namespace: planned.namespace,
        name,
        outcome,
        resource_version: written.metadata().resource_version.clone(),
    });
    Ok(())
}
