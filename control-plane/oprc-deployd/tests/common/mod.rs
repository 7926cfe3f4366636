#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use oprc_deployd::cluster::MemoryStore;
use oprc_deployd::config::DeploydConfig;
use oprc_deployd::errors::{RegistryError, SourceError};
use oprc_deployd::manifest::ManifestSource;
use oprc_deployd::registry::wire::{
    ApplicationInstancePayload, LoadBalancerEntry, LoadBalancerProperties,
    RegistryResource, ResourcePayload, SecretRef,
};
use oprc_deployd::registry::{Credentials, Registry, ScopedQuery};
use oprc_deployd::request::DeploymentRequest;
use oprc_deployd::service::DeployService;

pub const MANIFEST_BASE: &str = "http://manifests.local";

// Env guard utilities
pub struct EnvGuard {
    key: &'static str,
    old: Option<String>,
}
impl Drop for EnvGuard {
    fn drop(&mut self) {
        unsafe {
            if let Some(ref v) = self.old {
                std::env::set_var(self.key, v);
            } else {
                std::env::remove_var(self.key);
            }
        }
    }
}
pub fn set_env(key: &'static str, val: &str) -> EnvGuard {
    let old = std::env::var(key).ok();
    unsafe {
        std::env::set_var(key, val);
    }
    EnvGuard { key, old }
}

pub fn config() -> DeploydConfig {
    DeploydConfig {
        manifest_base_urls: MANIFEST_BASE.to_string(),
        cluster_subdomain: "apps.local".to_string(),
        ..Default::default()
    }
}

pub fn request(app: &str) -> DeploymentRequest {
    DeploymentRequest {
        application: app.to_string(),
        version: "1.0.0".to_string(),
        environment: "t0".to_string(),
        zone: "fss".to_string(),
        namespace: "default".to_string(),
        username: "deployer".to_string(),
        password: "hunter2".to_string(),
        ..Default::default()
    }
}

pub fn manifest_url(app: &str, version: &str) -> String {
    format!("{MANIFEST_BASE}/{app}/{version}/app.yaml")
}

/// Serves manifest documents from memory.
#[derive(Default)]
pub struct StaticManifests {
    docs: Mutex<HashMap<String, String>>,
}

impl StaticManifests {
    pub fn with(self, url: String, doc: &str) -> Self {
        self.docs.lock().unwrap().insert(url, doc.to_string());
        self
    }
}

#[async_trait]
impl ManifestSource for StaticManifests {
    async fn fetch(&self, url: &str) -> Result<String, SourceError> {
        self.docs
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                url: url.to_string(),
            })
    }
}

/// Registry double recording every call by name.
#[derive(Default)]
pub struct FakeRegistry {
    pub resources: Mutex<HashMap<(String, String), RegistryResource>>,
    pub secrets: Mutex<HashMap<String, String>>,
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    pub load_balancer: Mutex<Vec<LoadBalancerEntry>>,
    pub created: Mutex<Vec<ResourcePayload>>,
    pub updated: Mutex<Vec<(i64, ResourcePayload)>>,
    pub instances: Mutex<Vec<ApplicationInstancePayload>>,
    pub calls: Mutex<Vec<String>>,
    pub fail_instance_registration: Mutex<bool>,
    pub unknown_environment: Mutex<bool>,
    pub unknown_application: Mutex<bool>,
}

impl FakeRegistry {
    /// Resource with plain properties and secrets held behind references.
    pub fn add_resource(
        &self,
        id: i64,
        alias: &str,
        resource_type: &str,
        properties: &[(&str, &str)],
        secrets: &[(&str, &str)],
    ) {
        let mut secret_refs = BTreeMap::new();
        for (name, value) in secrets {
            let reference = format!("http://registry/secrets/{alias}/{name}");
            self.secrets
                .lock()
                .unwrap()
                .insert(reference.clone(), value.to_string());
            secret_refs.insert(name.to_string(), SecretRef { reference });
        }
        let resource = RegistryResource {
            id,
            alias: alias.to_string(),
            resource_type: resource_type.to_string(),
            properties: properties
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            secrets: secret_refs,
            files: BTreeMap::new(),
        };
        self.resources
            .lock()
            .unwrap()
            .insert((alias.to_string(), resource_type.to_string()), resource);
    }

    /// Attaches a downloadable file to an already added resource.
    pub fn add_file(
        &self,
        alias: &str,
        resource_type: &str,
        entry: &str,
        filename: &str,
        content: &[u8],
    ) {
        let reference = format!("http://registry/files/{alias}/{filename}");
        self.files
            .lock()
            .unwrap()
            .insert(reference.clone(), content.to_vec());
        self.add_file_descriptor(
            alias,
            resource_type,
            entry,
            serde_json::json!({ "filename": filename, "ref": reference }),
        );
    }

    /// Raw file descriptor, as the registry would send it.
    pub fn add_file_descriptor(
        &self,
        alias: &str,
        resource_type: &str,
        entry: &str,
        descriptor: serde_json::Value,
    ) {
        let mut resources = self.resources.lock().unwrap();
        let resource = resources
            .get_mut(&(alias.to_string(), resource_type.to_string()))
            .expect("add_resource first");
        resource.files.insert(entry.to_string(), descriptor);
    }

    pub fn add_load_balancer(&self, url: &str, context_roots: &str) {
        self.load_balancer.lock().unwrap().push(LoadBalancerEntry {
            properties: LoadBalancerProperties {
                url: Some(url.to_string()),
                context_roots: Some(context_roots.to_string()),
            },
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn get_scoped_resource(
        &self,
        query: ScopedQuery<'_>,
        _creds: &Credentials,
    ) -> Result<RegistryResource, RegistryError> {
        self.record("get_scoped_resource");
        self.resources
            .lock()
            .unwrap()
            .get(&(query.alias.to_string(), query.resource_type.to_string()))
            .cloned()
            .ok_or(RegistryError::NotFound)
    }

    async fn get_load_balancer_config(
        &self,
        _application: &str,
        _environment: &str,
        _creds: &Credentials,
    ) -> Result<Vec<LoadBalancerEntry>, RegistryError> {
        self.record("get_load_balancer_config");
        Ok(self.load_balancer.lock().unwrap().clone())
    }

    async fn fetch_secret(
        &self,
        reference: &str,
        _creds: &Credentials,
    ) -> Result<String, RegistryError> {
        self.record("fetch_secret");
        self.secrets
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or(RegistryError::NotFound)
    }

    async fn fetch_file(
        &self,
        reference: &str,
        _creds: &Credentials,
    ) -> Result<Vec<u8>, RegistryError> {
        self.record("fetch_file");
        self.files
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or(RegistryError::NotFound)
    }

    async fn create_resource(
        &self,
        payload: &ResourcePayload,
        _creds: &Credentials,
    ) -> Result<i64, RegistryError> {
        self.record("create_resource");
        let mut created = self.created.lock().unwrap();
        created.push(payload.clone());
        Ok(1000 + created.len() as i64)
    }

    async fn update_resource(
        &self,
        id: i64,
        payload: &ResourcePayload,
        _creds: &Credentials,
    ) -> Result<i64, RegistryError> {
        self.record("update_resource");
        self.updated.lock().unwrap().push((id, payload.clone()));
        Ok(id)
    }

    async fn get_environment(
        &self,
        _name: &str,
        _creds: &Credentials,
    ) -> Result<(), RegistryError> {
        self.record("get_environment");
        if *self.unknown_environment.lock().unwrap() {
            return Err(RegistryError::NotFound);
        }
        Ok(())
    }

    async fn get_application(
        &self,
        _name: &str,
        _creds: &Credentials,
    ) -> Result<(), RegistryError> {
        self.record("get_application");
        if *self.unknown_application.lock().unwrap() {
            return Err(RegistryError::NotFound);
        }
        Ok(())
    }

    async fn register_application_instance(
        &self,
        payload: &ApplicationInstancePayload,
        _creds: &Credentials,
    ) -> Result<(), RegistryError> {
        self.record("register_application_instance");
        if *self.fail_instance_registration.lock().unwrap() {
            return Err(RegistryError::Status {
                status: 503,
                body: "registry down".into(),
            });
        }
        self.instances.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

pub struct Harness {
    pub store: MemoryStore,
    pub registry: Arc<FakeRegistry>,
    pub service: Arc<DeployService>,
}

pub fn harness(manifests: StaticManifests) -> Harness {
    harness_with(manifests, config())
}

pub fn harness_with(manifests: StaticManifests, cfg: DeploydConfig) -> Harness {
    let store = MemoryStore::new();
    let registry = Arc::new(FakeRegistry::default());
    let service = DeployService::new(
        Arc::new(store.clone()),
        Some(registry.clone() as Arc<dyn Registry>),
        Arc::new(manifests),
        Arc::new(cfg),
    )
    .expect("service");
    Harness {
        store,
        registry,
        service: Arc::new(service),
    }
}
