//! Environment of the main container, derived from resolved dependencies.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvVar, EnvVarSource, KeyToPath, SecretKeySelector};

use crate::errors::DeployError;
use crate::manifest::Manifest;
use crate::naming::{mounted_file_name, sanitize, secret_key_name};
use crate::registry::ResolvedResource;
use crate::request::DeploymentRequest;

/// Mount point of dependency files inside the main container. Must not be a
/// parent of the vault mount.
pub const DEPENDENCY_MOUNT_PATH: &str = "/var/run/secrets/oaas.io/deps/";

/// Name of the secret volume carrying dependency files.
pub const DEPENDENCY_VOLUME: &str = "dependencies";

/// Address of the leader-election sidecar as seen from the app.
pub const ELECTOR_PATH: &str = "localhost:4040";

const BUILT_IN: &str = "built-in";

/// Everything derived from the resolved dependencies in one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvPlan {
    /// Ordered environment of the main container.
    pub vars: Vec<EnvVar>,
    /// Secret data key → value for the application's Secret.
    pub secret_data: BTreeMap<String, Vec<u8>>,
    /// Items of the dependency volume, one per file.
    pub file_items: Vec<KeyToPath>,
}

impl EnvPlan {
    pub fn has_secret_material(&self) -> bool {
        !self.secret_data.is_empty()
    }

    pub fn has_files(&self) -> bool {
        !self.file_items.is_empty()
    }
}

/// Tracks which source produced each name so a clash can report both.
#[derive(Default)]
struct Names {
    seen: BTreeMap<String, String>,
}

impl Names {
    fn claim(&mut self, name: &str, source: &str) -> Result<(), DeployError> {
        if let Some(first) = self.seen.get(name) {
            return Err(DeployError::NameCollision {
                name: name.to_string(),
                first: first.clone(),
                second: source.to_string(),
            });
        }
        self.seen.insert(name.to_string(), source.to_string());
        Ok(())
    }
}

struct Builder<'a> {
    app: &'a str,
    plan: EnvPlan,
    env_names: Names,
    secret_keys: Names,
}

impl Builder<'_> {
    fn literal(&mut self, name: String, value: String, source: &str) -> Result<(), DeployError> {
        self.env_names.claim(&name, source)?;
        self.plan.vars.push(EnvVar {
            name,
            value: Some(value),
            ..Default::default()
        });
        Ok(())
    }

    fn secret(&mut self, key: String, value: Vec<u8>, source: &str) -> Result<(), DeployError> {
        self.secret_keys.claim(&key, source)?;
        self.plan.secret_data.insert(key, value);
        Ok(())
    }

    fn secret_ref(&mut self, name: String, key: &str, source: &str) -> Result<(), DeployError> {
        self.env_names.claim(&name, source)?;
        self.plan.vars.push(EnvVar {
            name,
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: self.app.to_string(),
                    key: key.to_string(),
                    optional: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
        Ok(())
    }
}

/// Env name for `key` of `res`: the manifest remap verbatim if present,
/// otherwise the sanitized `alias_key` (or just `key` for application
/// properties, which are not alias-prefixed).
pub fn env_name(res: &ResolvedResource, key: &str) -> String {
    if let Some(mapped) = res.property_map.get(key) {
        return mapped.clone();
    }
    if res.is_application_properties() {
        sanitize(key)
    } else {
        sanitize(&format!("{}_{}", res.name, key))
    }
}

/// Builds the env list, secret data and file items for the main container.
/// Fails on the first env name or secret key produced twice.
pub fn build_env(
    manifest: &Manifest,
    req: &DeploymentRequest,
    resources: &[ResolvedResource],
) -> Result<EnvPlan, DeployError> {
    let mut b = Builder {
        app: &req.application,
        plan: EnvPlan::default(),
        env_names: Names::default(),
        secret_keys: Names::default(),
    };

    b.literal("APP_NAME".into(), req.application.clone(), BUILT_IN)?;
    b.literal("APP_VERSION".into(), req.version.clone(), BUILT_IN)?;
    b.literal("APP_ENVIRONMENT".into(), req.environment.clone(), BUILT_IN)?;
    b.literal("APP_NAMESPACE".into(), req.namespace.clone(), BUILT_IN)?;
    if manifest.leader_election {
        b.literal("ELECTOR_PATH".into(), ELECTOR_PATH.into(), BUILT_IN)?;
    }

    for res in resources.iter().filter(|r| !r.is_load_balancer_config()) {
        let source = res.label();

        for (key, value) in &res.properties {
            b.literal(env_name(res, key), value.clone(), &source)?;
        }

        for (key, value) in &res.secrets {
            let secret_key = secret_key_name(&res.name, key);
            b.secret_ref(env_name(res, key), &secret_key, &source)?;
            b.secret(secret_key, value.clone().into_bytes(), &source)?;
        }

        for (file, content) in &res.files {
            let secret_key = secret_key_name(&res.name, file);
            let path = mounted_file_name(&res.name, file);
            b.literal(
                env_name(res, file),
                format!("{DEPENDENCY_MOUNT_PATH}{path}"),
                &source,
            )?;
            b.secret(secret_key.clone(), content.clone(), &source)?;
            b.plan.file_items.push(KeyToPath {
                key: secret_key,
                path,
                mode: None,
            });
        }
    }

    Ok(b.plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req() -> DeploymentRequest {
        DeploymentRequest {
            application: "app".into(),
            version: "1.0.0".into(),
            environment: "t0".into(),
            zone: "fss".into(),
            namespace: "default".into(),
            ..Default::default()
        }
    }

    fn resource(name: &str, ty: &str) -> ResolvedResource {
        ResolvedResource {
            name: name.into(),
            resource_type: ty.into(),
            ..Default::default()
        }
    }

    fn names(plan: &EnvPlan) -> Vec<&str> {
        plan.vars.iter().map(|v| v.name.as_str()).collect()
    }

    #[test]
    fn fixed_entries_then_resources_in_declaration_order() {
        let mut r1 = resource("r1", "db");
        r1.properties.insert("key1".into(), "value1".into());
        r1.secrets.insert("password".into(), "secret".into());
        let mut r2 = resource("dots.are.not.allowed", "baseurl");
        r2.properties.insert("key".into(), "v".into());
        let mut props = resource("props", "applicationproperties");
        props.properties.insert("key2.property".into(), "x".into());

        let plan = build_env(&Manifest::default(), &req(), &[r1, r2, props]).unwrap();
        assert_eq!(
            names(&plan),
            vec![
                "APP_NAME",
                "APP_VERSION",
                "APP_ENVIRONMENT",
                "APP_NAMESPACE",
                "R1_KEY1",
                "R1_PASSWORD",
                "DOTS_ARE_NOT_ALLOWED_KEY",
                "KEY2_PROPERTY",
            ]
        );
        assert_eq!(plan.vars[1].value.as_deref(), Some("1.0.0"));
        assert_eq!(plan.vars[4].value.as_deref(), Some("value1"));

        let secret_ref = plan.vars[5]
            .value_from
            .as_ref()
            .and_then(|s| s.secret_key_ref.as_ref())
            .unwrap();
        assert_eq!(secret_ref.name, "app");
        assert_eq!(secret_ref.key, "r1_password");
        assert!(plan.vars[5].value.is_none());

        assert_eq!(plan.secret_data.len(), 1);
        assert_eq!(plan.secret_data["r1_password"], b"secret");
        assert!(!plan.has_files());
    }

    #[test]
    fn property_map_is_used_verbatim() {
        let mut db = resource("mydb", "datasource");
        db.properties.insert("url".into(), "jdbc:x".into());
        db.properties.insert("username".into(), "u".into());
        db.secrets.insert("password".into(), "p".into());
        db.property_map.insert("username".into(), "MYAPPDB_USERNAME".into());
        db.property_map.insert("password".into(), "MYDB_PW".into());

        let plan = build_env(&Manifest::default(), &req(), &[db]).unwrap();
        assert_eq!(&names(&plan)[4..], &["MYDB_URL", "MYAPPDB_USERNAME", "MYDB_PW"]);
        // secret key is not affected by the remap
        assert!(plan.secret_data.contains_key("mydb_password"));
    }

    #[test]
    fn colliding_names_fail_naming_both_sources() {
        let mut cred = resource("srvapp", "credential");
        cred.secrets.insert("password".into(), "a".into());
        let mut cert = resource("srvapp", "certificate");
        cert.secrets.insert("password".into(), "b".into());

        let err = build_env(&Manifest::default(), &req(), &[cred, cert]).unwrap_err();
        match &err {
            DeployError::NameCollision { name, first, second } => {
                assert_eq!(name, "SRVAPP_PASSWORD");
                assert_eq!(first, "srvapp (credential)");
                assert_eq!(second, "srvapp (certificate)");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn env_collision_reports_env_name() {
        let mut a = resource("srvapp", "credential");
        a.properties.insert("password".into(), "a".into());
        let mut b = resource("srvapp", "baseurl");
        b.properties.insert("password".into(), "b".into());
        let err = build_env(&Manifest::default(), &req(), &[a, b]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("SRVAPP_PASSWORD"), "{msg}");
        assert!(msg.contains("srvapp (credential)"));
        assert!(msg.contains("srvapp (baseurl)"));
        assert!(msg.contains("propertyMap"));
    }

    #[test]
    fn remapped_secrets_still_collide_on_secret_key() {
        let mut a = resource("srvapp", "credential");
        a.secrets.insert("password".into(), "a".into());
        let mut b = resource("srvapp", "certificate");
        b.secrets.insert("password".into(), "b".into());
        b.property_map.insert("password".into(), "CERT_PASSWORD".into());
        let err = build_env(&Manifest::default(), &req(), &[a, b]).unwrap_err();
        assert!(
            matches!(err, DeployError::NameCollision { ref name, .. } if name == "srvapp_password")
        );
    }

    #[test]
    fn remap_onto_builtin_name_collides() {
        let mut r = resource("r", "db");
        r.properties.insert("v".into(), "x".into());
        r.property_map.insert("v".into(), "APP_VERSION".into());
        let err = build_env(&Manifest::default(), &req(), &[r]).unwrap_err();
        assert!(matches!(err, DeployError::NameCollision { ref first, .. } if first == "built-in"));
    }

    #[test]
    fn files_become_mounted_items_and_path_env() {
        let mut cert = resource("my.cert", "certificate");
        cert.files.insert("keystore.jks".into(), vec![0xca, 0xfe]);
        let mut manifest = Manifest::default();
        manifest.leader_election = true;

        let plan = build_env(&manifest, &req(), &[cert]).unwrap();
        let last = plan.vars.last().unwrap();
        assert_eq!(last.name, "MY_CERT_KEYSTORE_JKS");
        assert_eq!(
            last.value.as_deref(),
            Some("/var/run/secrets/oaas.io/deps/my_cert_keystore.jks")
        );
        assert!(names(&plan).contains(&"ELECTOR_PATH"));
        assert_eq!(plan.file_items.len(), 1);
        assert_eq!(plan.file_items[0].key, "my_cert_keystore_jks");
        assert_eq!(plan.file_items[0].path, "my_cert_keystore.jks");
        assert_eq!(plan.secret_data["my_cert_keystore_jks"], vec![0xca, 0xfe]);
    }

    #[test]
    fn load_balancer_config_contributes_nothing() {
        let mut lb = resource("", "LoadBalancerConfig");
        lb.ingresses.insert("app.example.com".into(), "/app".into());
        let plan = build_env(&Manifest::default(), &req(), &[lb]).unwrap();
        assert_eq!(plan.vars.len(), 4);
        assert!(!plan.has_secret_material());
    }
}
