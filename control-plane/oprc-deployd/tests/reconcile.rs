mod common;

use k8s_openapi::ByteString;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use oprc_deployd::cluster::{InjectedFailure, Op};
use oprc_deployd::controller::Outcome;
use oprc_deployd::errors::{ClusterError, DeployError};

use common::{StaticManifests, harness, manifest_url, request};

const R1_MANIFEST: &str = r#"
image: docker.io/team/app
replicas:
  min: 2
  max: 5
  cpuThresholdPercentage: 60
ingress:
  disabled: true
dependencies:
  used:
    - alias: r1
      resourceType: db
"#;

fn r1_harness() -> common::Harness {
    let h = harness(StaticManifests::default().with(manifest_url("app", "1.0.0"), R1_MANIFEST));
    h.registry
        .add_resource(1, "r1", "db", &[("key1", "value1")], &[("password", "secret")]);
    h
}

#[test_log::test(tokio::test)]
async fn single_dependency_end_to_end() {
    let h = r1_harness();
    let result = h.service.deploy(&request("app")).await.unwrap();

    assert_eq!(
        result.kinds(),
        vec![
            "ServiceAccount",
            "RoleBinding",
            "Secret",
            "Deployment",
            "Service",
            "HorizontalPodAutoscaler",
        ]
    );
    assert!(result.applied.iter().all(|a| a.outcome == Outcome::Created));
    assert!(result.skipped.contains(&"Ingress".to_string()));

    let deployment: Deployment = h.store.object("default", "app").await.unwrap();
    let pod = deployment.spec.unwrap().template.spec.unwrap();
    assert_eq!(pod.containers.len(), 1);
    let env = pod.containers[0].env.clone().unwrap();
    let key1 = env.iter().find(|e| e.name == "R1_KEY1").unwrap();
    assert_eq!(key1.value.as_deref(), Some("value1"));
    let password = env.iter().find(|e| e.name == "R1_PASSWORD").unwrap();
    assert!(password.value.is_none());
    let selector = password
        .value_from
        .as_ref()
        .and_then(|v| v.secret_key_ref.as_ref())
        .unwrap();
    assert_eq!(selector.name, "app");
    assert_eq!(selector.key, "r1_password");

    let secret: Secret = h.store.object("default", "app").await.unwrap();
    let data = secret.data.unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data["r1_password"], ByteString(b"secret".to_vec()));

    assert!(h.store.object::<Ingress>("default", "app").await.is_none());

    let hpa: HorizontalPodAutoscaler = h.store.object("default", "app").await.unwrap();
    let spec = hpa.spec.unwrap();
    assert_eq!(spec.min_replicas, Some(2));
    assert_eq!(spec.max_replicas, 5);

    let sync = result.registry.unwrap();
    assert_eq!(sync.used_ids, vec![1]);
    assert!(sync.exposed_ids.is_empty());
    assert_eq!(h.registry.instances.lock().unwrap().len(), 1);
}

#[test_log::test(tokio::test)]
async fn redeploy_updates_with_preserved_versions_and_cluster_ip() {
    let h = r1_harness();
    h.service.deploy(&request("app")).await.unwrap();
    let before: Service = h.store.object("default", "app").await.unwrap();
    let ip = before.spec.unwrap().cluster_ip;
    assert!(ip.is_some());

    let result = h.service.deploy(&request("app")).await.unwrap();
    assert!(result.applied.iter().all(|a| a.outcome == Outcome::Updated));

    let after: Service = h.store.object("default", "app").await.unwrap();
    assert_eq!(after.spec.unwrap().cluster_ip, ip);
    let dep = result.find("Deployment").unwrap();
    assert!(dep.resource_version.is_some());
}

#[test_log::test(tokio::test)]
async fn skip_registry_makes_no_registry_calls() {
    let h = r1_harness();
    let mut req = request("app");
    req.skip_registry = true;
    req.username.clear();
    req.password.clear();

    let result = h.service.deploy(&req).await.unwrap();
    assert!(h.registry.calls().is_empty());
    assert!(result.registry.is_none());
    // without resolution there is no secret material
    assert!(result.skipped.contains(&"Secret".to_string()));
    assert!(result.find("Secret").is_none());
    let deployment: Deployment = h.store.object("default", "app").await.unwrap();
    let env = deployment.spec.unwrap().template.spec.unwrap().containers[0]
        .env
        .clone()
        .unwrap();
    assert!(env.iter().all(|e| !e.name.starts_with("R1_")));
}

#[test_log::test(tokio::test)]
async fn missing_dependency_is_reported_before_any_write() {
    let h = harness(StaticManifests::default().with(manifest_url("app", "1.0.0"), R1_MANIFEST));
    let failure = h.service.deploy(&request("app")).await.unwrap_err();
    assert!(matches!(
        failure.error,
        DeployError::DependencyNotFound { ref alias, .. } if alias == "r1"
    ));
    assert_eq!(failure.error.status_code(), http::StatusCode::BAD_REQUEST);
    assert!(failure.applied.applied.is_empty());
    assert!(h.store.writes().await.is_empty());
}

#[test_log::test(tokio::test)]
async fn failure_midway_reports_what_was_applied() {
    let h = r1_harness();
    h.store
        .fail_on(
            "Service",
            Op::Create,
            InjectedFailure::Rejected {
                code: 422,
                message: "invalid".into(),
            },
        )
        .await;

    let failure = h.service.deploy(&request("app")).await.unwrap_err();
    assert_eq!(
        failure.applied.kinds(),
        vec!["ServiceAccount", "RoleBinding", "Secret", "Deployment"]
    );
    assert!(matches!(
        failure.error,
        DeployError::Cluster(ClusterError::Rejected { kind: "Service", .. })
    ));
    // applied objects stay, later ones were never attempted
    assert!(h.store.object::<Deployment>("default", "app").await.is_some());
    assert!(h.store.object::<HorizontalPodAutoscaler>("default", "app").await.is_none());
    assert!(!h.registry.calls().contains(&"register_application_instance".to_string()));
}

#[test_log::test(tokio::test)]
async fn conflict_is_surfaced_as_retryable() {
    let h = r1_harness();
    h.service.deploy(&request("app")).await.unwrap();
    h.store
        .fail_on("Deployment", Op::Update, InjectedFailure::Conflict)
        .await;

    let failure = h.service.deploy(&request("app")).await.unwrap_err();
    assert!(failure.error.is_retryable());
    assert_eq!(failure.error.status_code(), http::StatusCode::CONFLICT);

    h.store.clear_failures().await;
    h.service.deploy(&request("app")).await.unwrap();
}

#[test_log::test(tokio::test)]
async fn registry_failure_after_apply_keeps_cluster_state() {
    let h = r1_harness();
    *h.registry.fail_instance_registration.lock().unwrap() = true;

    let failure = h.service.deploy(&request("app")).await.unwrap_err();
    assert!(matches!(failure.error, DeployError::RegistryUnavailable { .. }));
    assert!(failure.error.is_retryable());
    assert_eq!(failure.applied.applied.len(), 6);
}

#[test_log::test(tokio::test)]
async fn ingress_and_alert_rules_when_enabled() {
    let manifest = r#"
image: docker.io/team/web
alerts:
  - alert: WebDown
    expr: up{app="web"} == 0
    for: 5m
    annotations:
      action: restart it
dependencies:
  exposed:
    - alias: webapi
      resourceType: RestService
      path: /api
"#;
    let h = harness(StaticManifests::default().with(manifest_url("web", "1.0.0"), manifest));
    let mut req = request("web");
    req.namespace = "team".into();

    let result = h.service.deploy(&req).await.unwrap();
    assert!(result.find("Ingress").is_some());
    assert!(result.find("ConfigMap").is_some());
    assert!(result.skipped.contains(&"Secret".to_string()));

    let ingress: Ingress = h.store.object("team", "web").await.unwrap();
    let host = ingress.spec.unwrap().rules.unwrap()[0].host.clone();
    assert_eq!(host.as_deref(), Some("web-team.apps.local"));

    let rules: ConfigMap = h.store.object("default", "app-rules").await.unwrap();
    assert!(rules.data.unwrap()["team-web.yml"].contains("WebDown"));

    let created = h.registry.created.lock().unwrap().clone();
    assert_eq!(created.len(), 1);
    assert_eq!(
        created[0].properties.url.as_deref(),
        Some("https://web-team.apps.local/api")
    );
    assert_eq!(result.registry.unwrap().exposed_ids, vec![1001]);
}

#[test_log::test(tokio::test)]
async fn name_collision_aborts_before_writes() {
    let manifest = r#"
dependencies:
  used:
    - alias: srvapp
      resourceType: credential
    - alias: srvapp
      resourceType: certificate
"#;
    let h = harness(StaticManifests::default().with(manifest_url("app", "1.0.0"), manifest));
    h.registry
        .add_resource(1, "srvapp", "credential", &[], &[("password", "a")]);
    h.registry
        .add_resource(2, "srvapp", "certificate", &[], &[("password", "b")]);

    let failure = h.service.deploy(&request("app")).await.unwrap_err();
    let msg = failure.error.to_string();
    assert!(msg.contains("SRVAPP_PASSWORD"), "{msg}");
    assert!(msg.contains("srvapp (credential)"));
    assert!(msg.contains("srvapp (certificate)"));
    assert!(h.store.writes().await.is_empty());
}
