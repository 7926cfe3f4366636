use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::wire::{
    ApplicationInstancePayload, LoadBalancerEntry, RegistryResource,
    ResourcePayload,
};
use super::{Credentials, LOAD_BALANCER_CONFIG, Registry, ScopedQuery};
use crate::config::RegistryConfig;
use crate::errors::RegistryError;
use crate::retry::{RetryPolicy, retry_transient};

/// reqwest-backed registry client. GETs are retried on transient failures;
/// writes are attempted once.
pub struct RegistryHttpClient {
    base_url: String,
    http: reqwest::Client,
    policy: RetryPolicy,
}

impl RegistryHttpClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        retry_attempts: usize,
    ) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            policy: RetryPolicy::with_attempts(retry_attempts),
        })
    }

    pub fn from_config(cfg: &RegistryConfig) -> Result<Option<Self>, RegistryError> {
        cfg.url
            .as_deref()
            .filter(|u| !u.is_empty())
            .map(|url| {
                Self::new(
                    url,
                    Duration::from_secs(cfg.timeout_secs),
                    cfg.retry_attempts,
                )
            })
            .transpose()
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(req: RequestBuilder) -> Result<Response, RegistryError> {
        let resp = req.send().await.map_err(map_transport)?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    /// GET with retry, decoded as JSON.
    async fn get_json<T: DeserializeOwned>(
        &self,
        op: &str,
        url: &str,
        query: &[(&str, &str)],
        creds: &Credentials,
    ) -> Result<T, RegistryError> {
        retry_transient(&self.policy, op, RegistryError::is_transient, || async {
            let resp = Self::send(
                self.http
                    .get(url)
                    .query(query)
                    .basic_auth(&creds.username, Some(&creds.password)),
            )
            .await?;
            let bytes = resp.bytes().await.map_err(map_transport)?;
            serde_json::from_slice(&bytes).map_err(|e| RegistryError::Decode(e.to_string()))
        })
        .await
    }

    async fn get_bytes(
        &self,
        op: &str,
        url: &str,
        creds: &Credentials,
    ) -> Result<Vec<u8>, RegistryError> {
        retry_transient(&self.policy, op, RegistryError::is_transient, || async {
            let resp = Self::send(
                self.http
                    .get(url)
                    .basic_auth(&creds.username, Some(&creds.password)),
            )
            .await?;
            Ok(resp.bytes().await.map_err(map_transport)?.to_vec())
        })
        .await
    }

    async fn exists(&self, op: &str, url: &str, creds: &Credentials) -> Result<(), RegistryError> {
        self.get_bytes(op, url, creds).await.map(|_| ())
    }
}

fn map_transport(e: reqwest::Error) -> RegistryError {
    if e.is_timeout() {
        RegistryError::Timeout
    } else {
        RegistryError::Transport(e)
    }
}

/// Resource id from the `Location` header's last path segment.
fn id_from_location(resp: &Response) -> Result<i64, RegistryError> {
    let location = resp
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            RegistryError::Decode(format!(
                "didn't receive a valid resource id, Location: {location:?}"
            ))
        })
}

#[async_trait]
impl Registry for RegistryHttpClient {
    async fn get_scoped_resource(
        &self,
        q: ScopedQuery<'_>,
        creds: &Credentials,
    ) -> Result<RegistryResource, RegistryError> {
        debug!(alias = %q.alias, resource_type = %q.resource_type, "registry lookup");
        self.get_json(
            "registry scopedresource",
            &self.url("/api/v2/scopedresource"),
            &[
                ("alias", q.alias),
                ("type", q.resource_type),
                ("environment", q.environment),
                ("application", q.application),
                ("zone", q.zone),
            ],
            creds,
        )
        .await
    }

    async fn get_load_balancer_config(
        &self,
        application: &str,
        environment: &str,
        creds: &Credentials,
    ) -> Result<Vec<LoadBalancerEntry>, RegistryError> {
        self.get_json(
            "registry loadbalancer config",
            &self.url("/api/v2/resources"),
            &[
                ("environment", environment),
                ("application", application),
                ("type", LOAD_BALANCER_CONFIG),
            ],
            creds,
        )
        .await
    }

    async fn fetch_secret(
        &self,
        reference: &str,
        creds: &Credentials,
    ) -> Result<String, RegistryError> {
        let bytes = self.get_bytes("registry secret", reference, creds).await?;
        String::from_utf8(bytes).map_err(|e| RegistryError::Decode(e.to_string()))
    }

    async fn fetch_file(
        &self,
        reference: &str,
        creds: &Credentials,
    ) -> Result<Vec<u8>, RegistryError> {
        self.get_bytes("registry file", reference, creds).await
    }

    async fn create_resource(
        &self,
        payload: &ResourcePayload,
        creds: &Credentials,
    ) -> Result<i64, RegistryError> {
        let resp = Self::send(
            self.http
                .post(self.url("/api/v2/resources/"))
                .basic_auth(&creds.username, Some(&creds.password))
                .json(payload),
        )
        .await?;
        id_from_location(&resp)
    }

    async fn update_resource(
        &self,
        id: i64,
        payload: &ResourcePayload,
        creds: &Credentials,
    ) -> Result<i64, RegistryError> {
        Self::send(
            self.http
                .put(self.url(&format!("/api/v2/resources/{id}")))
                .basic_auth(&creds.username, Some(&creds.password))
                .json(payload),
        )
        .await?;
        Ok(id)
    }

    async fn get_environment(&self, name: &str, creds: &Credentials) -> Result<(), RegistryError> {
        self.exists(
            "registry environment",
            &self.url(&format!("/api/v2/environments/{name}")),
            creds,
        )
        .await
    }

    async fn get_application(&self, name: &str, creds: &Credentials) -> Result<(), RegistryError> {
        self.exists(
            "registry application",
            &self.url(&format!("/api/v2/applications/{name}")),
            creds,
        )
        .await
    }

    async fn register_application_instance(
        &self,
        payload: &ApplicationInstancePayload,
        creds: &Credentials,
    ) -> Result<(), RegistryError> {
        Self::send(
            self.http
                .post(self.url("/api/v2/applicationinstances/"))
                .basic_auth(&creds.username, Some(&creds.password))
                .json(payload),
        )
        .await?;
        Ok(())
    }
}
