//! Access to the cluster object store.
//!
//! [`ObjectStore`] is the only seam the reconciler writes through; the
//! kube-backed store talks to the API server, the memory store backs tests.

mod kube_store;
mod memory;

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::RoleBinding;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::{Metadata, NamespaceResourceScope, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::errors::ClusterError;

pub use kube_store::KubeStore;
pub use memory::{InjectedFailure, MemoryStore, Op, StoreCall};

/// Namespaced object kinds the orchestrator manages.
pub trait ClusterObject:
    Resource<Scope = NamespaceResourceScope>
    + Metadata<Ty = ObjectMeta>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> ClusterObject for K where
    K: Resource<Scope = NamespaceResourceScope>
        + Metadata<Ty = ObjectMeta>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Get/create/update of one object kind.
#[async_trait]
pub trait ObjectStore<K: ClusterObject>: Send + Sync {
    /// `Ok(None)` when the object does not exist.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, ClusterError>;

    /// Fails with [`ClusterError::AlreadyExists`] if the name is taken.
    async fn create(&self, namespace: &str, obj: &K) -> Result<K, ClusterError>;

    /// Replaces the object. The resource version carried in `obj` is the
    /// optimistic-concurrency precondition; a stale one yields
    /// [`ClusterError::Conflict`].
    async fn update(&self, namespace: &str, obj: &K) -> Result<K, ClusterError>;
}

/// Every kind a deploy touches.
pub trait ClusterApi:
    ObjectStore<ServiceAccount>
    + ObjectStore<RoleBinding>
    + ObjectStore<Secret>
    + ObjectStore<Deployment>
    + ObjectStore<Service>
    + ObjectStore<Ingress>
    + ObjectStore<HorizontalPodAutoscaler>
    + ObjectStore<ConfigMap>
{
}

impl<T> ClusterApi for T where
    T: ObjectStore<ServiceAccount>
        + ObjectStore<RoleBinding>
        + ObjectStore<Secret>
        + ObjectStore<Deployment>
        + ObjectStore<Service>
        + ObjectStore<Ingress>
        + ObjectStore<HorizontalPodAutoscaler>
        + ObjectStore<ConfigMap>
{
}

pub(crate) fn object_name<K: ClusterObject>(obj: &K) -> String {
    obj.metadata().name.clone().unwrap_or_default()
}
