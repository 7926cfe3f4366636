//! End-to-end handling of one deploy request.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use tracing::{info, instrument, warn};

use crate::cluster::{ClusterApi, ObjectStore};
use crate::config::DeploydConfig;
use crate::controller::{DeploymentResult, DeploymentStatusView, Reconciler, deployment_status};
use crate::errors::{DeployError, ReconcileFailure};
use crate::manifest::{ManifestSource, load_manifest};
use crate::registry::{Registry, precheck, resolve_dependencies};
use crate::request::DeploymentRequest;

pub struct DeployService {
    reconciler: Reconciler,
    registry: Option<Arc<dyn Registry>>,
    manifests: Arc<dyn ManifestSource>,
    cfg: Arc<DeploydConfig>,
}

impl DeployService {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        registry: Option<Arc<dyn Registry>>,
        manifests: Arc<dyn ManifestSource>,
        cfg: Arc<DeploydConfig>,
    ) -> Result<Self, DeployError> {
        if registry.is_none() {
            warn!("no registry configured; only skipRegistry deploys will be accepted");
        }
        Ok(Self {
            reconciler: Reconciler::new(cluster, cfg.clone())?,
            registry,
            manifests,
            cfg,
        })
    }

    /// Validates the request, loads the manifest, resolves dependencies
    /// (unless `skipRegistry`) and reconciles.
    #[instrument(skip_all, fields(app = %req.application, namespace = %req.namespace))]
    pub async fn deploy(
        &self,
        req: &DeploymentRequest,
    ) -> Result<DeploymentResult, ReconcileFailure> {
        req.validate().map_err(DeployError::from)?;

        let registry = if req.skip_registry {
            None
        } else {
            let registry = self.registry.as_deref().ok_or_else(|| {
                DeployError::Config(
                    "DEPLOYD_REGISTRY_URL is not set; deploy with skipRegistry".into(),
                )
            })?;
            Some(registry)
        };

        let manifest = load_manifest(self.manifests.as_ref(), req, &self.cfg).await?;

        let resources = match registry {
            Some(registry) => {
                precheck(registry, req).await?;
                resolve_dependencies(registry, &manifest, req).await?
            }
            None => {
                info!("skipRegistry set; dependency resolution bypassed");
                Vec::new()
            }
        };

        self.reconciler
            .reconcile(req, &manifest, &resources, registry)
            .await
    }

    /// Rollout view of the application's Deployment, `None` if absent.
    pub async fn status(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DeploymentStatusView>, DeployError> {
        let current: Option<Deployment> =
            ObjectStore::<Deployment>::get(self.reconciler.cluster(), namespace, name).await?;
        Ok(current.as_ref().map(deployment_status))
    }
}
