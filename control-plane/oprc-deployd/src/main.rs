use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use envconfig::Envconfig;
use kube::Client;
use oprc_deployd::cluster::{ClusterApi, KubeStore};
use oprc_deployd::config::DeploydConfig;
use oprc_deployd::init_tracing;
use oprc_deployd::manifest::HttpManifestSource;
use oprc_deployd::registry::{Registry, RegistryHttpClient};
use oprc_deployd::service::DeployService;
use oprc_deployd::web::{AppState, run_http_server};
use tracing::info;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    if let Err(e) = rustls::crypto::CryptoProvider::install_default(
        rustls::crypto::aws_lc_rs::default_provider(),
    ) {
        tracing::debug!(
            ?e,
            "CryptoProvider already installed or incompatible; proceeding"
        );
    }

    let cfg = DeploydConfig::init_from_env()?;
    cfg.validate().map_err(anyhow::Error::msg)?;
    let cfg = Arc::new(cfg);
    info!(?cfg, "Starting deployd");

    let client = Client::try_default().await?;
    let cluster: Arc<dyn ClusterApi> =
        Arc::new(KubeStore::new(client, cfg.cluster_timeout()));
    let registry = RegistryHttpClient::from_config(&cfg.registry)
        .context("building registry client")?
        .map(|c| Arc::new(c) as Arc<dyn Registry>);
    let manifests = Arc::new(
        HttpManifestSource::new(cfg.manifest_timeout(), cfg.registry.retry_attempts)
            .context("building manifest client")?,
    );

    let service = DeployService::new(cluster, registry, manifests, cfg.clone())?;
    let state = AppState {
        service: Arc::new(service),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.http_port));
    run_http_server(addr, state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    })
    .await?;
    Ok(())
}
