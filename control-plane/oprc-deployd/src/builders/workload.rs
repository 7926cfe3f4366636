use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment,
};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, HTTPGetAction, Lifecycle, LifecycleHandler,
    PodSpec, PodTemplateSpec, Probe, ResourceRequirements,
    SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::{BuildContext, HTTP_PORT_NAME, object_meta};
use crate::env::{DEPENDENCY_MOUNT_PATH, DEPENDENCY_VOLUME, ELECTOR_PATH};
use crate::manifest::{HealthEndpoint, ResourceList};

const ELECTOR_PORT: i32 = 4040;
const REDIS_EXPORTER_PORT: i32 = 9121;

/// The application's Deployment.
///
/// On update the current replica count is kept, since the autoscaler owns it
/// once the object exists.
pub fn build_deployment(current: Option<&Deployment>, ctx: &BuildContext) -> Deployment {
    let labels = ctx.labels();
    let replicas = current
        .and_then(|d| d.spec.as_ref())
        .and_then(|s| s.replicas)
        .unwrap_or(ctx.manifest.replicas.min);

    Deployment {
        metadata: object_meta(
            current.map(|d| &d.metadata),
            ctx.name(),
            ctx.namespace(),
            labels.clone(),
        ),
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateDeployment {
                    max_surge: Some(IntOrString::String("25%".to_string())),
                    max_unavailable: Some(IntOrString::Int(0)),
                }),
            }),
            progress_deadline_seconds: Some(300),
            revision_history_limit: Some(10),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    name: Some(ctx.name().to_string()),
                    labels: Some(labels),
                    annotations: Some(pod_annotations(ctx)),
                    ..Default::default()
                }),
                spec: Some(pod_spec(ctx)),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn pod_annotations(ctx: &BuildContext) -> BTreeMap<String, String> {
    let prometheus = &ctx.manifest.prometheus;
    let mut annotations = BTreeMap::from([
        (
            "prometheus.io/scrape".to_string(),
            prometheus.enabled.to_string(),
        ),
        ("prometheus.io/port".to_string(), prometheus.port.clone()),
        ("prometheus.io/path".to_string(), prometheus.path.clone()),
    ]);
    if ctx.manifest.istio.enabled {
        annotations.insert("sidecar.istio.io/inject".to_string(), "true".to_string());
    }
    annotations
}

fn pod_spec(ctx: &BuildContext) -> PodSpec {
    let mut containers = vec![main_container(ctx)];
    if ctx.manifest.leader_election {
        containers.push(elector_container(ctx));
    }
    if ctx.manifest.redis {
        containers.push(redis_exporter_container(ctx));
    }

    let mut pod = PodSpec {
        containers,
        service_account_name: Some(ctx.name().to_string()),
        restart_policy: Some("Always".to_string()),
        dns_policy: Some("ClusterFirst".to_string()),
        ..Default::default()
    };

    if ctx.env.has_files() {
        pod.volumes = Some(vec![Volume {
            name: DEPENDENCY_VOLUME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(ctx.name().to_string()),
                items: Some(ctx.env.file_items.clone()),
                ..Default::default()
            }),
            ..Default::default()
        }]);
    }

    if let Some(vault) = ctx.vault {
        vault.inject(
            &mut pod,
            ctx.name(),
            ctx.namespace(),
            ctx.manifest.vault.sidecar,
        );
    }
    pod
}

fn main_container(ctx: &BuildContext) -> Container {
    let m = ctx.manifest;
    let mounts = ctx.env.has_files().then(|| {
        vec![VolumeMount {
            name: DEPENDENCY_VOLUME.to_string(),
            mount_path: DEPENDENCY_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        }]
    });

    Container {
        name: ctx.name().to_string(),
        image: Some(format!("{}:{}", m.image, ctx.req.version)),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ports: Some(vec![ContainerPort {
            name: Some(HTTP_PORT_NAME.to_string()),
            container_port: m.port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: Some(ctx.env.vars.clone()),
        resources: Some(ResourceRequirements {
            limits: Some(quantities(&m.resources.limits)),
            requests: Some(quantities(&m.resources.requests)),
            ..Default::default()
        }),
        liveness_probe: Some(http_check(&m.healthcheck.liveness)),
        readiness_probe: Some(http_check(&m.healthcheck.readiness)),
        lifecycle: m.pre_stop_hook_path.as_ref().map(|path| Lifecycle {
            pre_stop: Some(LifecycleHandler {
                http_get: Some(http_get(path)),
                ..Default::default()
            }),
            ..Default::default()
        }),
        volume_mounts: mounts,
        ..Default::default()
    }
}

fn elector_container(ctx: &BuildContext) -> Container {
    Container {
        name: "elector".to_string(),
        image: Some(ctx.cfg.leader_elector_image.clone()),
        args: Some(vec![
            format!("--election={}", ctx.name()),
            format!("--http={ELECTOR_PATH}"),
            format!("--election-namespace={}", ctx.namespace()),
        ]),
        ports: Some(vec![ContainerPort {
            container_port: ELECTOR_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

fn redis_exporter_container(ctx: &BuildContext) -> Container {
    Container {
        name: "redis-exporter".to_string(),
        image: Some(ctx.cfg.redis_exporter_image.clone()),
        ports: Some(vec![ContainerPort {
            name: Some("metrics".to_string()),
            container_port: REDIS_EXPORTER_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: Some(vec![EnvVar {
            name: "REDIS_ADDR".to_string(),
            value: Some("localhost:6379".to_string()),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

fn http_get(path: &str) -> HTTPGetAction {
    HTTPGetAction {
        path: Some(path.to_string()),
        port: IntOrString::String(HTTP_PORT_NAME.to_string()),
        ..Default::default()
    }
}

fn http_check(p: &HealthEndpoint) -> Probe {
    Probe {
        http_get: Some(http_get(&p.path)),
        initial_delay_seconds: Some(p.initial_delay),
        period_seconds: Some(p.period_seconds),
        failure_threshold: Some(p.failure_threshold),
        timeout_seconds: Some(p.timeout),
        ..Default::default()
    }
}

fn quantities(list: &ResourceList) -> BTreeMap<String, Quantity> {
    BTreeMap::from([
        ("cpu".to_string(), Quantity(list.cpu.clone())),
        ("memory".to_string(), Quantity(list.memory.clone())),
    ])
}
