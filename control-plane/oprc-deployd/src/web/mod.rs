//! HTTP surface: `POST /deploy` and the rollout status endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::controller::DeploymentResult;
use crate::errors::ApiError;
use crate::request::DeploymentRequest;
use crate::service::DeployService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DeployService>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/deploy", post(deploy))
        .route("/deploystatus/{namespace}/{name}", get(deploy_status))
        .route("/health", get(health))
        .route("/healthz", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_http_server(
    addr: SocketAddr,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "deployd listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn deploy(
    State(state): State<AppState>,
    Json(req): Json<DeploymentRequest>,
) -> Result<Json<DeploymentResult>, ApiError> {
    info!(
        app = %req.application,
        version = %req.version,
        namespace = %req.namespace,
        skip_registry = req.skip_registry,
        "deploy requested"
    );
    match state.service.deploy(&req).await {
        Ok(result) => Ok(Json(result)),
        Err(failure) => {
            error!(
                app = %req.application,
                applied = ?failure.applied.kinds(),
                error = %failure.error,
                "deploy failed"
            );
            Err(ApiError::Deploy(failure))
        }
    }
}

async fn deploy_status(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let view = state
        .service
        .status(&namespace, &name)
        .await
        .map_err(|e| ApiError::InternalServerError(e.to_string()))?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "did not find deployment: {name} namespace: {namespace}"
            ))
        })?;
    Ok((view.status.http_status(), Json(view)).into_response())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "oprc-deployd",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
