use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};

use super::{BuildContext, SERVICE_PORT, default_ingress_host, object_meta};
use crate::naming::sanitize_dns_label;
use crate::request::Zone;

/// Public host of an sbs-zone deployment:
/// `{app}-{environment}.{sbs_public_subdomain}`.
pub fn sbs_public_host(app: &str, environment: &str, subdomain: &str) -> String {
    format!("{app}-{}.{subdomain}", sanitize_dns_label(environment))
}

/// Ingress rule set: the default host, one rule per load-balancer binding
/// and, in the sbs zone, the environment-suffixed public host. All rules
/// route to the application's Service.
pub fn build_ingress(current: Option<&Ingress>, ctx: &BuildContext) -> Ingress {
    let app = ctx.name();
    let mut rules = vec![rule(
        default_ingress_host(app, ctx.namespace(), &ctx.cfg.cluster_subdomain),
        "/".to_string(),
        app,
    )];

    for (host, path) in ctx.resources.iter().flat_map(|r| r.ingresses.iter()) {
        rules.push(rule(host.clone(), normalize_path(path), app));
    }

    if ctx.req.zone() == Zone::Sbs {
        if let Some(subdomain) = ctx.cfg.sbs_public_subdomain.as_deref() {
            rules.push(rule(
                sbs_public_host(app, &ctx.req.environment, subdomain),
                "/".to_string(),
                app,
            ));
        }
    }

    Ingress {
        metadata: object_meta(
            current.map(|i| &i.metadata),
            app,
            ctx.namespace(),
            ctx.labels(),
        ),
        spec: Some(IngressSpec {
            ingress_class_name: current
                .and_then(|i| i.spec.as_ref())
                .and_then(|s| s.ingress_class_name.clone()),
            rules: Some(rules),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn normalize_path(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

fn rule(host: String, path: String, service: &str) -> IngressRule {
    IngressRule {
        host: Some(host),
        http: Some(HTTPIngressRuleValue {
            paths: vec![HTTPIngressPath {
                path: Some(path),
                path_type: "Prefix".to_string(),
                backend: IngressBackend {
                    service: Some(IngressServiceBackend {
                        name: service.to_string(),
                        port: Some(ServiceBackendPort {
                            number: Some(SERVICE_PORT),
                            ..Default::default()
                        }),
                    }),
                    ..Default::default()
                },
            }],
        }),
    }
}
