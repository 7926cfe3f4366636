use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler,
    HorizontalPodAutoscalerSpec, MetricSpec, MetricTarget, ResourceMetricSource,
};

use super::{BuildContext, object_meta};

/// CPU-utilisation autoscaler for the application's Deployment.
pub fn build_autoscaler(
    current: Option<&HorizontalPodAutoscaler>,
    ctx: &BuildContext,
) -> HorizontalPodAutoscaler {
    let replicas = &ctx.manifest.replicas;
    HorizontalPodAutoscaler {
        metadata: object_meta(
            current.map(|h| &h.metadata),
            ctx.name(),
            ctx.namespace(),
            ctx.labels(),
        ),
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".to_string()),
                kind: "Deployment".to_string(),
                name: ctx.name().to_string(),
            },
            min_replicas: Some(replicas.min),
            max_replicas: replicas.max,
            metrics: Some(vec![MetricSpec {
                type_: "Resource".to_string(),
                resource: Some(ResourceMetricSource {
                    name: "cpu".to_string(),
                    target: MetricTarget {
                        type_: "Utilization".to_string(),
                        average_utilization: Some(
                            replicas.cpu_threshold_percentage,
                        ),
                        ..Default::default()
                    },
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
