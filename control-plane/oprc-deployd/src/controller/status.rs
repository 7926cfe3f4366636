use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeployStatus {
    Success,
    InProgress,
    Failed,
}

impl DeployStatus {
    /// 200 when rolled out, 202 while progressing, 500 when stuck.
    pub fn http_status(&self) -> http::StatusCode {
        match self {
            DeployStatus::Success => http::StatusCode::OK,
            DeployStatus::InProgress => http::StatusCode::ACCEPTED,
            DeployStatus::Failed => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Rollout summary of one Deployment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatusView {
    pub name: String,
    pub desired: i32,
    pub current: i32,
    pub up_to_date: i32,
    pub available: i32,
    pub containers: Vec<String>,
    pub images: Vec<String>,
    pub status: DeployStatus,
    pub reason: String,
}

fn exceeded_progress_deadline(status: &DeploymentStatus) -> bool {
    status.conditions.iter().flatten().any(|c| {
        c.type_ == "Progressing" && c.reason.as_deref() == Some("ProgressDeadlineExceeded")
    })
}

/// Classifies the rollout of `deployment`, mirroring `kubectl rollout status`.
pub fn deployment_status(deployment: &Deployment) -> DeploymentStatusView {
    let name = deployment.metadata.name.clone().unwrap_or_default();
    let status = deployment.status.clone().unwrap_or_default();
    let spec = deployment.spec.as_ref();
    let desired = spec.and_then(|s| s.replicas).unwrap_or(1);
    let updated = status.updated_replicas.unwrap_or(0);
    let current = status.replicas.unwrap_or(0);
    let available = status.available_replicas.unwrap_or(0);

    let generation = deployment.metadata.generation.unwrap_or(0);
    let observed = status.observed_generation.unwrap_or(0);

    let (state, reason) = if generation > observed {
        (
            DeployStatus::InProgress,
            "Waiting for deployment spec update to be observed".to_string(),
        )
    } else if exceeded_progress_deadline(&status) {
        (
            DeployStatus::Failed,
            format!("deployment {name} exceeded its progress deadline"),
        )
    } else if updated < desired {
        (
            DeployStatus::InProgress,
            format!(
                "Waiting for rollout to finish: {updated} out of {desired} new replicas have been updated."
            ),
        )
    } else if current > updated {
        (
            DeployStatus::InProgress,
            format!(
                "Waiting for rollout to finish: {} old replicas are pending termination.",
                current - updated
            ),
        )
    } else if available < updated {
        (
            DeployStatus::InProgress,
            format!(
                "Waiting for rollout to finish: {available} of {updated} updated replicas are available."
            ),
        )
    } else {
        (
            DeployStatus::Success,
            format!("deployment {name} successfully rolled out"),
        )
    };

    let containers = spec
        .and_then(|s| s.template.spec.as_ref())
        .map(|p| p.containers.as_slice())
        .unwrap_or_default();

    DeploymentStatusView {
        name,
        desired,
        current,
        up_to_date: updated,
        available,
        containers: containers.iter().map(|c| c.name.clone()).collect(),
        images: containers
            .iter()
            .map(|c| c.image.clone().unwrap_or_default())
            .collect(),
        status: state,
        reason,
    }
}
