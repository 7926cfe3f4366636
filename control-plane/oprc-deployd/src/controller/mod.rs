//! Reconciliation of one deploy request against the cluster.

mod reconcile;
mod status;

use std::fmt;

use serde::Serialize;

use crate::registry::RegistrySync;

pub use reconcile::Reconciler;
pub use status::{DeployStatus, DeploymentStatusView, deployment_status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Created,
    Updated,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Created => "created",
            Outcome::Updated => "updated",
        })
    }
}

/// One object written during a reconcile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedResource {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub outcome: Outcome,
    /// Version the cluster returned for the write.
    pub resource_version: Option<String>,
}

/// What a reconcile did, in apply order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResult {
    pub applied: Vec<AppliedResource>,
    /// Kinds deliberately not written (e.g. `Secret` without secret material).
    pub skipped: Vec<String>,
    /// Ids published to and used from the registry; absent when skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<RegistrySync>,
}

impl DeploymentResult {
    pub fn find(&self, kind: &str) -> Option<&AppliedResource> {
        self.applied.iter().find(|a| a.kind == kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.applied.iter().map(|a| a.kind.as_str()).collect()
    }
}

impl fmt::Display for DeploymentResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for a in &self.applied {
            writeln!(f, "{} {}/{} {}", a.kind, a.namespace, a.name, a.outcome)?;
        }
        if !self.skipped.is_empty() {
            writeln!(f, "skipped: {}", self.skipped.join(", "))?;
        }
        if let Some(sync) = &self.registry {
            writeln!(
                f,
                "registry: exposed {:?}, used {:?}",
                sync.exposed_ids, sync.used_ids
            )?;
        }
        Ok(())
    }
}
