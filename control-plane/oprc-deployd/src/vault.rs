//! Optional Vault secret fetcher added to the pod as an init container and,
//! on request, as a sidecar.

use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, PodSpec, Volume, VolumeMount,
};

use crate::config::VaultConfig;

pub const VAULT_VOLUME: &str = "vault-secrets";
pub const VAULT_MOUNT_PATH: &str = "/var/run/secrets/oaas.io/vault";

/// Settings of an enabled injector; built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultInjector {
    addr: String,
    image: String,
    auth_path: String,
    kv_path: String,
}

impl VaultInjector {
    /// `None` when injection is disabled. Errors list every missing setting.
    pub fn from_config(cfg: &VaultConfig) -> Result<Option<Self>, String> {
        if !cfg.enabled {
            return Ok(None);
        }
        cfg.validate()?;
        let get = |v: &Option<String>| v.clone().unwrap_or_default();
        Ok(Some(Self {
            addr: get(&cfg.addr),
            image: get(&cfg.init_container_image),
            auth_path: get(&cfg.auth_path),
            kv_path: get(&cfg.kv_path),
        }))
    }

    /// Adds the shared volume, mounts it into the container named `app`
    /// and appends the fetcher containers.
    pub fn inject(&self, pod: &mut PodSpec, app: &str, namespace: &str, sidecar: bool) {
        let mount = VolumeMount {
            name: VAULT_VOLUME.to_string(),
            mount_path: VAULT_MOUNT_PATH.to_string(),
            ..Default::default()
        };
        pod.volumes.get_or_insert_with(Vec::new).push(Volume {
            name: VAULT_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource {
                medium: Some("Memory".to_string()),
                size_limit: None,
            }),
            ..Default::default()
        });

        if let Some(main) = pod.containers.iter_mut().find(|c| c.name == app) {
            main.volume_mounts
                .get_or_insert_with(Vec::new)
                .push(mount.clone());
        }

        pod.init_containers
            .get_or_insert_with(Vec::new)
            .push(self.container(&mount, app, namespace, false));
        if sidecar {
            pod.containers
                .push(self.container(&mount, app, namespace, true));
        }
    }

    fn container(
        &self,
        mount: &VolumeMount,
        app: &str,
        namespace: &str,
        sidecar: bool,
    ) -> Container {
        let env = |name: &str, value: String| EnvVar {
            name: name.to_string(),
            value: Some(value),
            ..Default::default()
        };
        Container {
            name: if sidecar { "vks-sidecar" } else { "vks-init" }.to_string(),
            image: Some(self.image.clone()),
            volume_mounts: Some(vec![mount.clone()]),
            env: Some(vec![
                env("VKS_VAULT_ADDR", self.addr.clone()),
                env("VKS_AUTH_PATH", self.auth_path.clone()),
                env("VKS_KV_PATH", format!("{}/{app}/{namespace}", self.kv_path)),
                env("VKS_VAULT_ROLE", app.to_string()),
                env("VKS_SECRET_DEST_PATH", VAULT_MOUNT_PATH.to_string()),
                env("VKS_IS_SIDECAR", sidecar.to_string()),
            ]),
            ..Default::default()
        }
    }
}
