use std::sync::LazyLock;

use regex::Regex;

use super::Manifest;
use crate::errors::{ValidationError, ValidationErrors};

static QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+(\.[0-9]+)?(m|[EPTGMK]i?|[eE][0-9]+)?$")
        .unwrap_or_else(|e| panic!("quantity regex: {e}"))
});

const EXPOSABLE_TYPES: &[&str] = &["restservice", "webserviceendpoint"];

/// Cpu/memory notation accepted by the cluster, e.g. `200Mi`, `100m`, `1.5`.
pub fn is_valid_quantity(value: &str) -> bool {
    QUANTITY.is_match(value)
}

/// Checks a merged manifest once before anything is built from it.
pub fn validate_manifest(m: &Manifest) -> Result<(), ValidationErrors> {
    let mut errs = ValidationErrors::default();

    let last_colon = m.image.rfind(':');
    if last_colon.is_some() && last_colon > m.image.rfind('/') {
        errs.push(ValidationError::new("Image cannot contain tag").field("Image", &m.image));
    }
    if m.image.trim().is_empty() {
        errs.push(ValidationError::new("Image is not set").field("Image", ""));
    }

    if m.replicas.max == 0 {
        errs.push(
            ValidationError::new("Replicas.Max is not set").field("Replicas.Max", m.replicas.max),
        );
    }
    if m.replicas.min == 0 {
        errs.push(
            ValidationError::new("Replicas.Min is not set").field("Replicas.Min", m.replicas.min),
        );
    }
    if m.replicas.min > m.replicas.max {
        errs.push(
            ValidationError::new("Replicas.Min is larger than Replicas.Max.")
                .field("Replicas.Max", m.replicas.max)
                .field("Replicas.Min", m.replicas.min),
        );
    }
    let threshold = m.replicas.cpu_threshold_percentage;
    if !(10..=90).contains(&threshold) {
        errs.push(
            ValidationError::new("CpuThreshold must be between 10 and 90.")
                .field("Replicas.CpuThreshold", threshold),
        );
    }

    let quantities = [
        ("Resources.Requests.Memory", &m.resources.requests.memory),
        ("Resources.Limits.Memory", &m.resources.limits.memory),
        ("Resources.Requests.Cpu", &m.resources.requests.cpu),
        ("Resources.Limits.Cpu", &m.resources.limits.cpu),
    ];
    for (key, value) in quantities {
        if !is_valid_quantity(value) {
            errs.push(
                ValidationError::new(
                    "Not a valid quantity value. Are you using correct notation?",
                )
                .field(key, value),
            );
        }
    }

    for r in &m.dependencies.used {
        if r.alias.is_empty() || r.resource_type.is_empty() {
            errs.push(
                ValidationError::new("Alias and ResourceType must be specified")
                    .field("Alias", &r.alias),
            );
        }
    }
    for r in &m.dependencies.exposed {
        if r.alias.is_empty() || r.resource_type.is_empty() {
            errs.push(
                ValidationError::new("Alias and ResourceType must be specified")
                    .field("Alias", &r.alias),
            );
        } else if !EXPOSABLE_TYPES.contains(&r.resource_type.to_ascii_lowercase().as_str()) {
            errs.push(
                ValidationError::new("Exposed resource type must be RestService or WebserviceEndpoint")
                    .field("Alias", &r.alias)
                    .field("ResourceType", &r.resource_type),
            );
        }
    }

    if m.port <= 0 || m.port > 65535 {
        errs.push(ValidationError::new("Port must be between 1 and 65535").field("Port", m.port));
    }

    for rule in &m.alerts {
        let mut missing = Vec::new();
        if rule.alert.is_empty() {
            missing.push("alert");
        }
        if rule.expr.is_empty() {
            missing.push("expr");
        }
        if rule.for_.is_empty() {
            missing.push("for");
        }
        if !rule.annotations.contains_key("action") {
            missing.push("annotations.action");
        }
        if !missing.is_empty() {
            errs.push(
                ValidationError::new("Alert rule is missing required fields")
                    .field("Alert", &rule.alert)
                    .field("Missing", missing.join(",")),
            );
        }
    }

    errs.into_result()
}
