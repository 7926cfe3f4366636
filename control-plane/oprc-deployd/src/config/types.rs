use std::time::Duration;

use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct DeploydConfig {
    #[envconfig(from = "HTTP_PORT", default = "8081")]
    pub http_port: u16,

    /// Suffix of the default ingress host (`{app}[-{ns}].{subdomain}`).
    /// Env: DEPLOYD_CLUSTER_SUBDOMAIN
    #[envconfig(from = "DEPLOYD_CLUSTER_SUBDOMAIN", default = "apps.local")]
    pub cluster_subdomain: String,

    /// Public host suffix used for apps deployed to the sbs zone.
    /// Env: DEPLOYD_SBS_PUBLIC_SUBDOMAIN
    #[envconfig(from = "DEPLOYD_SBS_PUBLIC_SUBDOMAIN")]
    pub sbs_public_subdomain: Option<String>,

    #[envconfig(from = "DEPLOYD_IMAGE_REGISTRY", default = "docker.io")]
    pub image_registry: String,

    /// ClusterRole bound to every application's service account.
    #[envconfig(from = "DEPLOYD_APP_CLUSTER_ROLE", default = "app-default")]
    pub app_cluster_role: String,

    /// Namespace holding the shared `app-rules` ConfigMap.
    #[envconfig(from = "DEPLOYD_ALERTS_NAMESPACE", default = "default")]
    pub alerts_namespace: String,

    #[envconfig(
        from = "DEPLOYD_LEADER_ELECTOR_IMAGE",
        default = "registry.k8s.io/leader-elector:0.5"
    )]
    pub leader_elector_image: String,

    #[envconfig(
        from = "DEPLOYD_REDIS_EXPORTER_IMAGE",
        default = "oliver006/redis_exporter:v1.58.0"
    )]
    pub redis_exporter_image: String,

    /// Comma-separated base URLs tried in order when a request carries no
    /// manifest URL. Each resolves to `{base}/{app}/{version}/app.yaml`.
    /// Env: DEPLOYD_MANIFEST_BASE_URLS
    #[envconfig(from = "DEPLOYD_MANIFEST_BASE_URLS", default = "")]
    pub manifest_base_urls: String,

    #[envconfig(from = "DEPLOYD_MANIFEST_TIMEOUT_SECS", default = "10")]
    pub manifest_timeout_secs: u64,

    /// Timeout applied to each cluster API call.
    #[envconfig(from = "DEPLOYD_CLUSTER_TIMEOUT_SECS", default = "15")]
    pub cluster_timeout_secs: u64,

    #[envconfig(nested)]
    pub registry: RegistryConfig,

    #[envconfig(nested)]
    pub vault: VaultConfig,
}

#[derive(Envconfig, Clone, Debug)]
pub struct RegistryConfig {
    /// Base URL of the dependency registry. Without it every deploy must set
    /// `skipRegistry`. Calls authenticate with the deploy request's own
    /// credentials.
    /// Env: DEPLOYD_REGISTRY_URL
    #[envconfig(from = "DEPLOYD_REGISTRY_URL")]
    pub url: Option<String>,

    #[envconfig(from = "DEPLOYD_REGISTRY_TIMEOUT_SECS", default = "10")]
    pub timeout_secs: u64,

    /// Attempts for idempotent reads (1 disables retry).
    #[envconfig(from = "DEPLOYD_REGISTRY_RETRY_ATTEMPTS", default = "3")]
    pub retry_attempts: usize,

    #[envconfig(
        from = "DEPLOYD_WSDL_REPOSITORY_URL",
        default = "http://maven.local/nexus/service/local/artifact/maven/redirect"
    )]
    pub wsdl_repository_url: String,
}

/// Vault init-container injection. Off unless explicitly enabled.
#[derive(Envconfig, Clone, Debug, Default)]
pub struct VaultConfig {
    #[envconfig(from = "DEPLOYD_VAULT_ENABLED", default = "false")]
    pub enabled: bool,
    #[envconfig(from = "DEPLOYD_VAULT_ADDR")]
    pub addr: Option<String>,
    #[envconfig(from = "DEPLOYD_VAULT_INIT_CONTAINER_IMAGE")]
    pub init_container_image: Option<String>,
    #[envconfig(from = "DEPLOYD_VAULT_AUTH_PATH")]
    pub auth_path: Option<String>,
    #[envconfig(from = "DEPLOYD_VAULT_KV_PATH")]
    pub kv_path: Option<String>,
}

impl VaultConfig {
    /// Lists every missing variable, not just the first one.
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("DEPLOYD_VAULT_ADDR", &self.addr),
            ("DEPLOYD_VAULT_INIT_CONTAINER_IMAGE", &self.init_container_image),
            ("DEPLOYD_VAULT_AUTH_PATH", &self.auth_path),
            ("DEPLOYD_VAULT_KV_PATH", &self.kv_path),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, v)| v.as_deref().is_none_or(str::is_empty))
            .map(|(k, _)| *k)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "vault injection enabled but missing {}",
                missing.join(", ")
            ))
        }
    }
}

impl DeploydConfig {
    pub fn manifest_bases(&self) -> Vec<String> {
        self.manifest_base_urls
            .split(',')
            .map(|s| s.trim().trim_end_matches('/'))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn cluster_timeout(&self) -> Duration {
        Duration::from_secs(self.cluster_timeout_secs)
    }

    pub fn manifest_timeout(&self) -> Duration {
        Duration::from_secs(self.manifest_timeout_secs)
    }

    /// Startup checks that envconfig cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.vault.enabled {
            self.vault.validate()?;
        }
        if self.cluster_subdomain.trim().is_empty() {
            return Err("DEPLOYD_CLUSTER_SUBDOMAIN must not be empty".into());
        }
        Ok(())
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 10,
            retry_attempts: 3,
            wsdl_repository_url:
                "http://maven.local/nexus/service/local/artifact/maven/redirect"
                    .into(),
        }
    }
}

impl Default for DeploydConfig {
    fn default() -> Self {
        Self {
            http_port: 8081,
            cluster_subdomain: "apps.local".into(),
            sbs_public_subdomain: None,
            image_registry: "docker.io".into(),
            app_cluster_role: "app-default".into(),
            alerts_namespace: "default".into(),
            leader_elector_image: "registry.k8s.io/leader-elector:0.5".into(),
            redis_exporter_image: "oliver006/redis_exporter:v1.58.0".into(),
            manifest_base_urls: String::new(),
            manifest_timeout_secs: 10,
            cluster_timeout_secs: 15,
            registry: RegistryConfig::default(),
            vault: VaultConfig::default(),
        }
    }
}
