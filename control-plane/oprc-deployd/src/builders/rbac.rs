use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};

use super::{BuildContext, object_meta};

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Service account the pods run as. Token and pull-secret references the
/// cluster attached to an existing account are kept.
pub fn build_service_account(
    current: Option<&ServiceAccount>,
    ctx: &BuildContext,
) -> ServiceAccount {
    ServiceAccount {
        metadata: object_meta(
            current.map(|s| &s.metadata),
            ctx.name(),
            ctx.namespace(),
            ctx.labels(),
        ),
        secrets: current.and_then(|s| s.secrets.clone()),
        image_pull_secrets: current.and_then(|s| s.image_pull_secrets.clone()),
        automount_service_account_token: current
            .and_then(|s| s.automount_service_account_token),
    }
}

/// Binds the application's service account to the configured ClusterRole.
/// `roleRef` is immutable in the cluster, so an existing binding keeps its
/// own.
pub fn build_role_binding(current: Option<&RoleBinding>, ctx: &BuildContext) -> RoleBinding {
    let role_ref = current
        .map(|rb| rb.role_ref.clone())
        .unwrap_or_else(|| RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: ctx.cfg.app_cluster_role.clone(),
        });
    RoleBinding {
        metadata: object_meta(
            current.map(|rb| &rb.metadata),
            ctx.name(),
            ctx.namespace(),
            ctx.labels(),
        ),
        role_ref,
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: ctx.name().to_string(),
            namespace: Some(ctx.namespace().to_string()),
            ..Default::default()
        }]),
    }
}
