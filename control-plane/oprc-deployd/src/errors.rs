use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::controller::DeploymentResult;

/// One failed static check, with the offending field values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields.insert(key.into(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn push(&mut self, err: ValidationError) {
        self.errors.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() { Ok(()) } else { Err(self) }
    }

    pub fn messages(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.message.as_str()).collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            f.write_str(&e.message)?;
            if !e.fields.is_empty() {
                let fields: Vec<String> =
                    e.fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, " ({})", fields.join(", "))?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("resource not found in registry")]
    NotFound,

    #[error("registry returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("could not decode registry response: {0}")]
    Decode(String),

    #[error("malformed registry resource: {0}")]
    Malformed(String),

    #[error("registry request timed out")]
    Timeout,
}

impl RegistryError {
    /// Transport failures and 5xx answers may succeed on a second attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            RegistryError::Transport(_) | RegistryError::Timeout => true,
            RegistryError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Failure fetching one manifest document.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP GET failed for url: {url}. {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("got HTTP status code {status} fetching manifest from URL: {url}")]
    Status { url: String, status: u16 },

    #[error("could not read body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("no manifest at {url}")]
    NotFound { url: String },
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Transport { .. } | SourceError::Body { .. } => true,
            SourceError::Status { status, .. } => *status >= 500,
            SourceError::NotFound { .. } => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("conflict writing {kind} {name}: {message}")]
    Conflict {
        kind: &'static str,
        name: String,
        message: String,
    },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("cluster call for {kind} {name} timed out")]
    Timeout { kind: &'static str, name: String },

    #[error("cluster API rejected {kind} {name}: {message}")]
    Rejected {
        kind: &'static str,
        name: String,
        code: u16,
        message: String,
    },

    #[error("kube error: {0}")]
    Kube(#[from] kube::Error),

    #[error("could not convert object: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ClusterError {
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ClusterError::Conflict { .. } | ClusterError::AlreadyExists { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("dependency {alias} of type {resource_type} not found in registry")]
    DependencyNotFound {
        alias: String,
        resource_type: String,
    },

    #[error("registry unavailable while {context}: {source}")]
    RegistryUnavailable {
        context: String,
        #[source]
        source: RegistryError,
    },

    #[error("dependency {alias} of type {resource_type} is malformed: {reason}")]
    MalformedDependency {
        alias: String,
        resource_type: String,
        reason: String,
    },

    #[error("could not fetch manifest: {0}")]
    ManifestFetch(String),

    #[error(
        "found duplicate name {name} from {first} and {second}; use propertyMap to rename one of them"
    )]
    NameCollision {
        name: String,
        first: String,
        second: String,
    },

    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl DeployError {
    pub fn registry(context: impl Into<String>, source: RegistryError) -> Self {
        DeployError::RegistryUnavailable {
            context: context.into(),
            source,
        }
    }

    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            DeployError::Validation(_) | DeployError::DependencyNotFound { .. } => {
                StatusCode::BAD_REQUEST
            }
            DeployError::Cluster(e) if e.is_conflict() => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the caller may simply resend the same request.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeployError::Cluster(e) => {
                e.is_conflict() || matches!(e, ClusterError::Timeout { .. })
            }
            DeployError::RegistryUnavailable { source, .. } => {
                source.is_transient()
            }
            _ => false,
        }
    }
}

/// A reconcile that stopped partway: `applied` lists what was written before
/// `error` occurred. Nothing is rolled back.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct ReconcileFailure {
    pub applied: DeploymentResult,
    #[source]
    pub error: DeployError,
}

impl ReconcileFailure {
    pub fn before_apply(error: DeployError) -> Self {
        Self {
            applied: DeploymentResult::default(),
            error,
        }
    }
}

impl From<DeployError> for ReconcileFailure {
    fn from(error: DeployError) -> Self {
        Self::before_apply(error)
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Deploy failed: {0}")]
    Deploy(#[from] ReconcileFailure),

    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        use axum::{Json, http::StatusCode};
        use serde_json::json;

        let (status, body) = match self {
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, json!({ "error": msg }))
            }
            ApiError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, json!({ "error": msg }))
            }
            ApiError::Deploy(failure) => {
                let mut body = json!({
                    "error": failure.error.to_string(),
                    "retryable": failure.error.is_retryable(),
                    "applied": failure.applied.applied,
                });
                if let DeployError::Validation(v) = &failure.error {
                    body["validation"] = json!(v.errors);
                }
                (failure.error.status_code(), body)
            }
            ApiError::InternalServerError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg }))
            }
        };

        (status, Json(body)).into_response()
    }
}
