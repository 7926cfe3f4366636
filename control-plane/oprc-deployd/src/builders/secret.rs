use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;

use super::{BuildContext, object_meta};

/// Opaque Secret holding every secret value and file of the dependencies.
/// Only built when the env plan carries secret material.
pub fn build_secret(current: Option<&Secret>, ctx: &BuildContext) -> Secret {
    let data = ctx
        .env
        .secret_data
        .iter()
        .map(|(k, v)| (k.clone(), ByteString(v.clone())))
        .collect();
    Secret {
        metadata: object_meta(
            current.map(|s| &s.metadata),
            ctx.name(),
            ctx.namespace(),
            ctx.labels(),
        ),
        type_: Some("Opaque".to_string()),
        data: Some(data),
        ..Default::default()
    }
}
