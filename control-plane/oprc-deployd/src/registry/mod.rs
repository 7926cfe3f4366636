//! Dependency registry: the external directory of named resources an
//! application consumes and publishes.

mod client;
mod resolver;
pub mod wire;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;

use crate::errors::RegistryError;
use wire::{
    ApplicationInstancePayload, LoadBalancerEntry, RegistryResource,
    ResourcePayload,
};

pub use client::RegistryHttpClient;
pub use resolver::{
    RegistrySync, exposed_hostname, precheck, publish_exposed,
    register_instance, resolve_dependencies, resolve_load_balancer,
    resolve_used, sync_registry,
};

pub const APPLICATION_PROPERTIES: &str = "applicationproperties";
pub const CERTIFICATE: &str = "certificate";
pub const LOAD_BALANCER_CONFIG: &str = "LoadBalancerConfig";

/// Caller credentials forwarded to every registry call.
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Lookup key of a scoped resource.
#[derive(Debug, Clone, Copy)]
pub struct ScopedQuery<'a> {
    pub alias: &'a str,
    pub resource_type: &'a str,
    pub environment: &'a str,
    pub application: &'a str,
    pub zone: &'a str,
}

#[async_trait]
pub trait Registry: Send + Sync {
    /// `NotFound` when no resource matches the query.
    async fn get_scoped_resource(
        &self,
        query: ScopedQuery<'_>,
        creds: &Credentials,
    ) -> Result<RegistryResource, RegistryError>;

    async fn get_load_balancer_config(
        &self,
        application: &str,
        environment: &str,
        creds: &Credentials,
    ) -> Result<Vec<LoadBalancerEntry>, RegistryError>;

    /// Follows a secret reference URL and returns the secret value.
    async fn fetch_secret(
        &self,
        reference: &str,
        creds: &Credentials,
    ) -> Result<String, RegistryError>;

    /// Downloads file content (certificates, keystores).
    async fn fetch_file(
        &self,
        reference: &str,
        creds: &Credentials,
    ) -> Result<Vec<u8>, RegistryError>;

    /// Returns the id the registry assigned.
    async fn create_resource(
        &self,
        payload: &ResourcePayload,
        creds: &Credentials,
    ) -> Result<i64, RegistryError>;

    /// Full overwrite of resource `id`.
    async fn update_resource(
        &self,
        id: i64,
        payload: &ResourcePayload,
        creds: &Credentials,
    ) -> Result<i64, RegistryError>;

    async fn get_environment(
        &self,
        name: &str,
        creds: &Credentials,
    ) -> Result<(), RegistryError>;

    async fn get_application(
        &self,
        name: &str,
        creds: &Credentials,
    ) -> Result<(), RegistryError>;

    async fn register_application_instance(
        &self,
        payload: &ApplicationInstancePayload,
        creds: &Credentials,
    ) -> Result<(), RegistryError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    pub environment: String,
    pub zone: String,
}

/// A used resource after resolution. Which maps may be populated depends on
/// the resource type:
///
/// | type                    | properties | secrets | files | ingresses |
/// |-------------------------|------------|---------|-------|-----------|
/// | `applicationproperties` | yes        |         |       |           |
/// | `certificate`           | yes        | yes     | yes   |           |
/// | `LoadBalancerConfig`    |            |         |       | yes       |
/// | anything else           | yes        | yes     |       |           |
///
/// [`ResolvedResource::check_shape`] enforces the table.
#[derive(Clone, Default, PartialEq)]
pub struct ResolvedResource {
    pub id: i64,
    /// Alias the resource is known by; may contain `.` or `:`.
    pub name: String,
    pub resource_type: String,
    pub scope: Scope,
    pub properties: BTreeMap<String, String>,
    /// Key → environment variable name, taken verbatim.
    pub property_map: BTreeMap<String, String>,
    pub secrets: BTreeMap<String, String>,
    /// File name → content.
    pub files: BTreeMap<String, Vec<u8>>,
    /// Host → path prefix.
    pub ingresses: BTreeMap<String, String>,
}

impl fmt::Debug for ResolvedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedResource")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("resource_type", &self.resource_type)
            .field("scope", &self.scope)
            .field("properties", &self.properties)
            .field("property_map", &self.property_map)
            .field("secrets", &self.secrets.keys().collect::<Vec<_>>())
            .field("files", &self.files.keys().collect::<Vec<_>>())
            .field("ingresses", &self.ingresses)
            .finish()
    }
}

impl ResolvedResource {
    pub fn is_application_properties(&self) -> bool {
        self.resource_type.eq_ignore_ascii_case(APPLICATION_PROPERTIES)
    }

    pub fn is_load_balancer_config(&self) -> bool {
        self.resource_type == LOAD_BALANCER_CONFIG
    }

    pub fn is_certificate(&self) -> bool {
        self.resource_type.eq_ignore_ascii_case(CERTIFICATE)
    }

    /// Whether this resource contributes anything to the app's Secret.
    pub fn has_secret_material(&self) -> bool {
        !self.secrets.is_empty() || !self.files.is_empty()
    }

    /// Display form used in collision reports.
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.resource_type)
    }

    /// Rejects populated fields the resource type may not carry.
    pub fn check_shape(&self) -> Result<(), String> {
        let (props, secrets, files, ingresses) = if self.is_application_properties() {
            (true, false, false, false)
        } else if self.is_certificate() {
            (true, true, true, false)
        } else if self.is_load_balancer_config() {
            (false, false, false, true)
        } else {
            (true, true, false, false)
        };
        let checks = [
            ("properties", props, self.properties.is_empty()),
            ("secrets", secrets, self.secrets.is_empty()),
            ("files", files, self.files.is_empty()),
            ("ingresses", ingresses, self.ingresses.is_empty()),
        ];
        for (field, allowed, empty) in checks {
            if !allowed && !empty {
                return Err(format!(
                    "{} must not carry {field}",
                    self.resource_type
                ));
            }
        }
        Ok(())
    }
}
