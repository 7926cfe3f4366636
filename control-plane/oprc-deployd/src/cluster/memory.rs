use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{ClusterObject, ObjectStore, object_name};
use crate::errors::ClusterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Create,
    Update,
}

/// One call as the store saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub op: Op,
    pub kind: &'static str,
    pub namespace: String,
    pub name: String,
}

/// Failure returned instead of performing a call.
#[derive(Debug, Clone)]
pub enum InjectedFailure {
    Conflict,
    Timeout,
    Rejected { code: u16, message: String },
}

impl InjectedFailure {
    fn into_error(self, kind: &'static str, name: &str) -> ClusterError {
        let name = name.to_string();
        match self {
            InjectedFailure::Conflict => ClusterError::Conflict {
                kind,
                name,
                message: "the object has been modified".into(),
            },
            InjectedFailure::Timeout => ClusterError::Timeout { kind, name },
            InjectedFailure::Rejected { code, message } => ClusterError::Rejected {
                kind,
                name,
                code,
                message,
            },
        }
    }
}

type Key = (&'static str, String, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<Key, Value>,
    next_version: u64,
    next_ip: u8,
    calls: Vec<StoreCall>,
    failures: HashMap<(&'static str, Op), InjectedFailure>,
}

impl State {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

/// In-process object store with API-server-like write semantics: resource
/// versions are assigned on every write, a stale version is a conflict and a
/// Service keeps the cluster IP it was given on creation.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `obj` as if an earlier deploy had created it.
    pub async fn seed<K: ClusterObject>(&self, namespace: &str, obj: K) -> K {
        let mut state = self.state.write().await;
        let name = object_name(&obj);
        let mut value = serde_json::to_value(&obj).unwrap_or(Value::Null);
        let rv = state.bump();
        value["metadata"]["resourceVersion"] = Value::String(rv);
        value["metadata"]["namespace"] = Value::String(namespace.to_string());
        state
            .objects
            .insert((K::KIND, namespace.to_string(), name), value.clone());
        serde_json::from_value(value).unwrap_or(obj)
    }

    pub async fn object<K: ClusterObject>(&self, namespace: &str, name: &str) -> Option<K> {
        let state = self.state.read().await;
        state
            .objects
            .get(&(K::KIND, namespace.to_string(), name.to_string()))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Makes every `op` on `kind` fail until cleared.
    pub async fn fail_on(&self, kind: &'static str, op: Op, failure: InjectedFailure) {
        self.state.write().await.failures.insert((kind, op), failure);
    }

    pub async fn clear_failures(&self) {
        self.state.write().await.failures.clear();
    }

    pub async fn calls(&self) -> Vec<StoreCall> {
        self.state.read().await.calls.clone()
    }

    /// Creates and updates, in order.
    pub async fn writes(&self) -> Vec<StoreCall> {
        self.calls()
            .await
            .into_iter()
            .filter(|c| c.op != Op::Get)
            .collect()
    }

    fn record(
        state: &mut State,
        op: Op,
        kind: &'static str,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError> {
        state.calls.push(StoreCall {
            op,
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        match state.failures.get(&(kind, op)) {
            Some(f) => Err(f.clone().into_error(kind, name)),
            None => Ok(()),
        }
    }
}

fn resource_version(value: &Value) -> Option<&str> {
    value["metadata"]["resourceVersion"].as_str()
}

#[async_trait]
impl<K: ClusterObject> ObjectStore<K> for MemoryStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, ClusterError> {
        let mut state = self.state.write().await;
        Self::record(&mut state, Op::Get, K::KIND, namespace, name)?;
        state
            .objects
            .get(&(K::KIND, namespace.to_string(), name.to_string()))
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(ClusterError::from)
    }

    async fn create(&self, namespace: &str, obj: &K) -> Result<K, ClusterError> {
        let name = object_name(obj);
        let mut state = self.state.write().await;
        Self::record(&mut state, Op::Create, K::KIND, namespace, &name)?;
        let key = (K::KIND, namespace.to_string(), name.clone());
        if state.objects.contains_key(&key) {
            return Err(ClusterError::AlreadyExists {
                kind: K::KIND,
                name,
            });
        }

        let mut value = serde_json::to_value(obj)?;
        if resource_version(&value).is_some() {
            return Err(ClusterError::Rejected {
                kind: K::KIND,
                name,
                code: 400,
                message: "resourceVersion should not be set on objects to be created"
                    .into(),
            });
        }
        let rv = state.bump();
        value["metadata"]["resourceVersion"] = Value::String(rv);
        value["metadata"]["uid"] = Value::String(format!("uid-{name}-{}", state.next_version));
        if K::KIND == "Service" && value["spec"]["clusterIP"].is_null() {
            state.next_ip = state.next_ip.wrapping_add(1);
            let ip = format!("10.96.0.{}", state.next_ip);
            value["spec"]["clusterIP"] = Value::String(ip.clone());
            value["spec"]["clusterIPs"] = Value::Array(vec![Value::String(ip)]);
        }
        state.objects.insert(key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn update(&self, namespace: &str, obj: &K) -> Result<K, ClusterError> {
        let name = object_name(obj);
        let mut state = self.state.write().await;
        Self::record(&mut state, Op::Update, K::KIND, namespace, &name)?;
        let key = (K::KIND, namespace.to_string(), name.clone());
        let Some(stored) = state.objects.get(&key) else {
            return Err(ClusterError::NotFound {
                kind: K::KIND,
                name,
            });
        };

        let mut value = serde_json::to_value(obj)?;
        if let Some(expected) = resource_version(&value) {
            if Some(expected) != resource_version(stored) {
                return Err(ClusterError::Conflict {
                    kind: K::KIND,
                    name,
                    message: "the object has been modified; please apply your \
                              changes to the latest version and try again"
                        .into(),
                });
            }
        }
        if K::KIND == "Service" {
            let old_ip = &stored["spec"]["clusterIP"];
            let new_ip = &value["spec"]["clusterIP"];
            if !old_ip.is_null() && old_ip != new_ip {
                return Err(ClusterError::Rejected {
                    kind: K::KIND,
                    name,
                    code: 422,
                    message: "spec.clusterIP: Invalid value: field is immutable".into(),
                });
            }
        }
        let uid = stored["metadata"]["uid"].clone();
        let rv = state.bump();
        value["metadata"]["resourceVersion"] = Value::String(rv);
        value["metadata"]["uid"] = uid;
        state.objects.insert(key, value.clone());
        Ok(serde_json::from_value(value)?)
    }
}
