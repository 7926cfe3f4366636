use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ValidationError, ValidationErrors};
use crate::naming::is_dns_label;

/// Namespaces nothing may be deployed into.
pub const SYSTEM_NAMESPACES: &[&str] =
    &["kube-system", "kube-public", "kube-node-lease"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Fss,
    Sbs,
    Iapp,
}

impl Zone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Fss => "fss",
            Zone::Sbs => "sbs",
            Zone::Iapp => "iapp",
        }
    }
}

impl FromStr for Zone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fss" => Ok(Zone::Fss),
            "sbs" => Ok(Zone::Sbs),
            "iapp" => Ok(Zone::Iapp),
            other => Err(format!("unknown zone {other}")),
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /deploy`.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentRequest {
    pub application: String,
    pub version: String,
    /// Registry environment the dependencies are resolved in.
    pub environment: String,
    pub zone: String,
    pub namespace: String,
    /// Caller's registry credentials; used for every registry call.
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub manifest_url: Option<String>,
    pub skip_registry: bool,
}

impl fmt::Debug for DeploymentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentRequest")
            .field("application", &self.application)
            .field("version", &self.version)
            .field("environment", &self.environment)
            .field("zone", &self.zone)
            .field("namespace", &self.namespace)
            .field("username", &self.username)
            .field("manifest_url", &self.manifest_url)
            .field("skip_registry", &self.skip_registry)
            .finish_non_exhaustive()
    }
}

impl DeploymentRequest {
    /// Runs every static check and reports all failures together.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errs = ValidationErrors::default();

        let mut required = vec![
            ("application", &self.application),
            ("version", &self.version),
            ("zone", &self.zone),
            ("namespace", &self.namespace),
        ];
        if !self.skip_registry {
            required.push(("environment", &self.environment));
            required.push(("username", &self.username));
            required.push(("password", &self.password));
        }
        for (field, value) in required {
            if value.trim().is_empty() {
                errs.push(
                    ValidationError::new(format!("{field} is required"))
                        .field(field, ""),
                );
            }
        }

        if !self.application.is_empty() && !is_dns_label(&self.application) {
            errs.push(
                ValidationError::new(
                    "application name must be a DNS-1123 label (lowercase alphanumerics and '-', max 63)",
                )
                .field("application", &self.application),
            );
        }

        if !self.zone.is_empty() && self.zone.parse::<Zone>().is_err() {
            errs.push(
                ValidationError::new("zone must be one of fss, sbs, iapp")
                    .field("zone", &self.zone),
            );
        }

        if SYSTEM_NAMESPACES.contains(&self.namespace.as_str()) {
            errs.push(
                ValidationError::new("deploying to system namespaces is disallowed")
                    .field("namespace", &self.namespace),
            );
        }

        errs.into_result()
    }

    /// Parsed zone; only meaningful after [`validate`](Self::validate).
    pub fn zone(&self) -> Zone {
        self.zone.parse().unwrap_or(Zone::Fss)
    }
}
