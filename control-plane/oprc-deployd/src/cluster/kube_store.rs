use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use kube::Api;
use kube::api::PostParams;
use tracing::{debug, instrument};

use super::{ClusterObject, ObjectStore, object_name};
use crate::errors::ClusterError;

/// [`ObjectStore`] over the API server. Every call is bounded by `timeout`.
#[derive(Clone)]
pub struct KubeStore {
    client: kube::Client,
    timeout: Duration,
}

impl KubeStore {
    pub fn new(client: kube::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn api<K: ClusterObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn bounded<K, T, F>(&self, name: &str, call: F) -> Result<T, ClusterError>
    where
        K: ClusterObject,
        F: Future<Output = Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(r) => r.map_err(|e| map_kube_error(K::KIND, name, e)),
            Err(_) => Err(ClusterError::Timeout {
                kind: K::KIND,
                name: name.to_string(),
            }),
        }
    }
}

pub(crate) fn map_kube_error(
    kind: &'static str,
    name: &str,
    err: kube::Error,
) -> ClusterError {
    match err {
        kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
            ClusterError::AlreadyExists {
                kind,
                name: name.to_string(),
            }
        }
        kube::Error::Api(ae) if ae.code == 409 => ClusterError::Conflict {
            kind,
            name: name.to_string(),
            message: ae.message,
        },
        kube::Error::Api(ae) if ae.code == 404 => ClusterError::NotFound {
            kind,
            name: name.to_string(),
        },
        kube::Error::Api(ae) => ClusterError::Rejected {
            kind,
            name: name.to_string(),
            code: ae.code,
            message: ae.message,
        },
        other => ClusterError::Kube(other),
    }
}

#[async_trait]
impl<K: ClusterObject> ObjectStore<K> for KubeStore {
    #[instrument(level = "debug", skip(self), fields(kind = K::KIND))]
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, ClusterError> {
        let api = self.api::<K>(namespace);
        self.bounded::<K, _, _>(name, api.get_opt(name)).await
    }

    #[instrument(level = "debug", skip(self, obj), fields(kind = K::KIND))]
    async fn create(&self, namespace: &str, obj: &K) -> Result<K, ClusterError> {
        let name = object_name(obj);
        let api = self.api::<K>(namespace);
        let created = self
            .bounded::<K, _, _>(&name, api.create(&PostParams::default(), obj))
            .await?;
        debug!(%name, "created");
        Ok(created)
    }

    #[instrument(level = "debug", skip(self, obj), fields(kind = K::KIND))]
    async fn update(&self, namespace: &str, obj: &K) -> Result<K, ClusterError> {
        let name = object_name(obj);
        let api = self.api::<K>(namespace);
        let updated = self
            .bounded::<K, _, _>(&name, api.replace(&name, &PostParams::default(), obj))
            .await?;
        debug!(%name, "replaced");
        Ok(updated)
    }
}
