use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;

use super::BuildContext;
use crate::errors::DeployError;
use crate::manifest::AlertRule;

/// Shared ConfigMap the Prometheus instance loads rule files from.
pub const ALERT_RULES_CONFIGMAP: &str = "app-rules";

#[derive(Serialize)]
struct RuleFile<'a> {
    groups: Vec<RuleGroup<'a>>,
}

#[derive(Serialize)]
struct RuleGroup<'a> {
    name: String,
    rules: &'a [AlertRule],
}

/// Data key holding one application's rule file.
pub fn alert_rules_key(namespace: &str, app: &str) -> String {
    format!("{namespace}-{app}.yml")
}

/// Writes the application's rule group into the shared ConfigMap, keeping
/// the entries of every other application.
pub fn build_alert_rules(
    current: Option<&ConfigMap>,
    ctx: &BuildContext,
) -> Result<ConfigMap, DeployError> {
    let group = format!("{}-{}", ctx.namespace(), ctx.name());
    let document = serde_yaml::to_string(&RuleFile {
        groups: vec![RuleGroup {
            name: group,
            rules: &ctx.manifest.alerts,
        }],
    })
    .map_err(|e| DeployError::Config(format!("could not render alert rules: {e}")))?;

    let mut cm = current.cloned().unwrap_or_else(|| ConfigMap {
        metadata: ObjectMeta {
            name: Some(ALERT_RULES_CONFIGMAP.to_string()),
            namespace: Some(ctx.cfg.alerts_namespace.clone()),
            ..Default::default()
        },
        ..Default::default()
    });
    cm.metadata.managed_fields = None;
    cm.data
        .get_or_insert_with(BTreeMap::new)
        .insert(alert_rules_key(ctx.namespace(), ctx.name()), document);
    Ok(cm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::fixtures::Fixture;

    fn rule() -> AlertRule {
        AlertRule {
            alert: "AppDown".into(),
            expr: "up{app=\"app\"} == 0".into(),
            for_: "5m".into(),
            annotations: BTreeMap::from([("action".into(), "page".into())]),
            ..Default::default()
        }
    }

    #[test]
    fn rule_group_is_written_under_app_key() {
        let mut f = Fixture::new();
        f.manifest.alerts = vec![rule()];
        let cm = build_alert_rules(None, &f.ctx()).unwrap();
        assert_eq!(cm.metadata.name.as_deref(), Some("app-rules"));
        assert_eq!(cm.metadata.namespace.as_deref(), Some("default"));

        let data = cm.data.unwrap();
        let doc = &data["default-app.yml"];
        let parsed: serde_yaml::Value = serde_yaml::from_str(doc).unwrap();
        let group = &parsed["groups"][0];
        assert_eq!(group["name"].as_str(), Some("default-app"));
        assert_eq!(group["rules"][0]["alert"].as_str(), Some("AppDown"));
        assert_eq!(group["rules"][0]["for"].as_str(), Some("5m"));
    }

    #[test]
    fn other_applications_entries_survive() {
        let mut f = Fixture::new();
        f.manifest.alerts = vec![rule()];
        let mut current = build_alert_rules(None, &f.ctx()).unwrap();
        current.metadata.resource_version = Some("21".into());
        current
            .data
            .as_mut()
            .unwrap()
            .insert("other-svc.yml".into(), "groups: []\n".into());

        let next = build_alert_rules(Some(&current), &f.ctx()).unwrap();
        assert_eq!(next.metadata.resource_version.as_deref(), Some("21"));
        let data = next.data.unwrap();
        assert!(data.contains_key("other-svc.yml"));
        assert!(data.contains_key("default-app.yml"));
    }
}
