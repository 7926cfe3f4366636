use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::{BuildContext, HTTP_PORT_NAME, SERVICE_PORT, object_meta};

/// ClusterIP Service on port 80 targeting the named `http` container port.
/// The cluster-assigned IPs of an existing Service are kept; the API server
/// rejects an update that clears them.
pub fn build_service(current: Option<&Service>, ctx: &BuildContext) -> Service {
    let labels = ctx.labels();
    let mut spec = ServiceSpec {
        type_: Some("ClusterIP".to_string()),
        selector: Some(labels.clone()),
        ports: Some(vec![ServicePort {
            name: Some(HTTP_PORT_NAME.to_string()),
            protocol: Some("TCP".to_string()),
            port: SERVICE_PORT,
            target_port: Some(IntOrString::String(HTTP_PORT_NAME.to_string())),
            ..Default::default()
        }]),
        ..Default::default()
    };
    if let Some(existing) = current.and_then(|s| s.spec.as_ref()) {
        spec.cluster_ip = existing.cluster_ip.clone();
        spec.cluster_ips = existing.cluster_ips.clone();
        spec.ip_families = existing.ip_families.clone();
        spec.ip_family_policy = existing.ip_family_policy.clone();
    }

    Service {
        metadata: object_meta(
            current.map(|s| &s.metadata),
            ctx.name(),
            ctx.namespace(),
            labels,
        ),
        spec: Some(spec),
        ..Default::default()
    }
}
