mod common;

use envconfig::Envconfig;
use oprc_deployd::config::DeploydConfig;
use serial_test::serial;

use common::set_env;

#[test]
#[serial]
fn defaults_apply_without_environment() {
    let cfg = DeploydConfig::init_from_hashmap(&Default::default()).unwrap();
    assert_eq!(cfg.http_port, 8081);
    assert_eq!(cfg.cluster_subdomain, "apps.local");
    assert!(cfg.registry.url.is_none());
    assert_eq!(cfg.registry.retry_attempts, 3);
    assert!(!cfg.vault.enabled);
    assert!(cfg.validate().is_ok());
}

#[test]
#[serial]
fn environment_overrides_defaults() {
    let _a = set_env("DEPLOYD_CLUSTER_SUBDOMAIN", "prod.example.com");
    let _b = set_env("DEPLOYD_MANIFEST_BASE_URLS", "http://a/, http://b");
    let _c = set_env("DEPLOYD_REGISTRY_URL", "http://registry.local");
    let _d = set_env("DEPLOYD_SBS_PUBLIC_SUBDOMAIN", "public.example.com");

    let cfg = DeploydConfig::init_from_env().unwrap();
    assert_eq!(cfg.cluster_subdomain, "prod.example.com");
    assert_eq!(cfg.manifest_bases(), vec!["http://a", "http://b"]);
    assert_eq!(cfg.registry.url.as_deref(), Some("http://registry.local"));
    assert_eq!(cfg.sbs_public_subdomain.as_deref(), Some("public.example.com"));
}

#[test]
#[serial]
fn enabled_vault_requires_every_setting() {
    let _a = set_env("DEPLOYD_VAULT_ENABLED", "true");
    let _b = set_env("DEPLOYD_VAULT_ADDR", "https://vault.local");

    let cfg = DeploydConfig::init_from_env().unwrap();
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("DEPLOYD_VAULT_INIT_CONTAINER_IMAGE"), "{err}");
    assert!(err.contains("DEPLOYD_VAULT_KV_PATH"));
}
