use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{Manifest, validate_manifest};
use crate::config::DeploydConfig;
use crate::errors::{DeployError, SourceError};
use crate::request::DeploymentRequest;
use crate::retry::{RetryPolicy, retry_transient};

/// Where manifest documents come from.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Returns the raw YAML document at `url`.
    async fn fetch(&self, url: &str) -> Result<String, SourceError>;
}

pub struct HttpManifestSource {
    http: reqwest::Client,
    policy: RetryPolicy,
}

impl HttpManifestSource {
    pub fn new(timeout: Duration, attempts: usize) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            policy: RetryPolicy::with_attempts(attempts),
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    async fn fetch(&self, url: &str) -> Result<String, SourceError> {
        retry_transient(&self.policy, "manifest fetch", SourceError::is_transient, || async {
            let resp = self
                .http
                .get(url)
                .send()
                .await
                .map_err(|source| SourceError::Transport {
                    url: url.to_string(),
                    source,
                })?;
            let status = resp.status();
            if !status.is_success() {
                return Err(SourceError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
            resp.text().await.map_err(|source| SourceError::Body {
                url: url.to_string(),
                source,
            })
        })
        .await
    }
}

/// Locations tried in order: the request's own URL, or one per configured base.
pub fn manifest_urls(req: &DeploymentRequest, cfg: &DeploydConfig) -> Vec<String> {
    match req.manifest_url.as_deref().filter(|u| !u.is_empty()) {
        Some(url) => vec![url.to_string()],
        None => cfg
            .manifest_bases()
            .into_iter()
            .map(|base| format!("{base}/{}/{}/app.yaml", req.application, req.version))
            .collect(),
    }
}

/// Fetches, merges over defaults and validates the manifest for `req`.
pub async fn load_manifest(
    source: &dyn ManifestSource,
    req: &DeploymentRequest,
    cfg: &DeploydConfig,
) -> Result<Manifest, DeployError> {
    let urls = manifest_urls(req, cfg);
    if urls.is_empty() {
        return Err(DeployError::ManifestFetch(
            "no manifest url given and DEPLOYD_MANIFEST_BASE_URLS is empty".into(),
        ));
    }

    let mut failures = Vec::new();
    for url in &urls {
        info!(%url, app = %req.application, "fetching manifest");
        let doc = match source.fetch(url).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!(%url, error = %e, "manifest fetch failed");
                failures.push(e.to_string());
                continue;
            }
        };
        let manifest =
            Manifest::from_yaml_with_defaults(&doc, &req.application, &cfg.image_registry)
                .map_err(|e| {
                    DeployError::ManifestFetch(format!("unable to unmarshal {e} from URL: {url}"))
                })?;
        validate_manifest(&manifest)?;
        return Ok(manifest);
    }

    Err(DeployError::ManifestFetch(failures.join("; ")))
}
