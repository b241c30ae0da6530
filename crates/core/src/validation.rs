//! Input validation
//!
//! All user-supplied names are checked before the first cluster call.
//! Kubernetes names follow RFC 1123 DNS labels; context names additionally
//! allow dots and underscores. Shell metacharacters are rejected outright
//! since every value eventually lands in a kubectl argument vector.

use regex::Regex;

use crate::error::{Result, SmartError};

const MAX_NAME_LEN: usize = 253;
const MAX_NAMESPACE_LEN: usize = 63;
const MAX_CONTEXT_LEN: usize = 253;

const SHELL_METACHARACTERS: &[char] = &[';', '&', '|', '$', '`', '\\', '\n', '\r', '<', '>'];

fn name_pattern() -> Regex {
    Regex::new(r"^[a-z0-9]([-a-z0-9.]*[a-z0-9])?$").expect("static pattern")
}

fn context_pattern() -> Regex {
    Regex::new(r"^[a-zA-Z0-9]([-a-zA-Z0-9._@:/]*[a-zA-Z0-9])?$").expect("static pattern")
}

fn reject_metacharacters(value: &str, what: &str) -> Result<()> {
    if value.chars().any(|c| SHELL_METACHARACTERS.contains(&c)) {
        return Err(SmartError::Input(format!(
            "{what} '{value}' contains forbidden characters"
        )));
    }
    Ok(())
}

/// Validate a resource name (RFC 1123 subdomain, max 253 chars).
pub fn validate_resource_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SmartError::Input("resource name cannot be empty".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(SmartError::Input(format!(
            "resource name too long: {} chars (max {MAX_NAME_LEN})",
            name.len()
        )));
    }
    reject_metacharacters(name, "resource name")?;
    if !name_pattern().is_match(name) {
        return Err(SmartError::Input(format!(
            "invalid resource name '{name}': must be lowercase alphanumeric with hyphens"
        )));
    }
    Ok(())
}

/// Validate a namespace (RFC 1123 label, max 63 chars).
pub fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.is_empty() {
        return Err(SmartError::Input("namespace cannot be empty".into()));
    }
    if namespace.len() > MAX_NAMESPACE_LEN {
        return Err(SmartError::Input(format!(
            "namespace too long: {} chars (max {MAX_NAMESPACE_LEN})",
            namespace.len()
        )));
    }
    reject_metacharacters(namespace, "namespace")?;
    if !name_pattern().is_match(namespace) || namespace.contains('.') {
        return Err(SmartError::Input(format!(
            "invalid namespace '{namespace}': must be lowercase alphanumeric with hyphens"
        )));
    }
    Ok(())
}

/// Validate a kubeconfig context name.
pub fn validate_context(context: &str) -> Result<()> {
    if context.is_empty() {
        return Err(SmartError::Input("context cannot be empty".into()));
    }
    if context.len() > MAX_CONTEXT_LEN {
        return Err(SmartError::Input(format!(
            "context too long: {} chars (max {MAX_CONTEXT_LEN})",
            context.len()
        )));
    }
    reject_metacharacters(context, "context")?;
    if !context_pattern().is_match(context) {
        return Err(SmartError::Input(format!("invalid context name '{context}'")));
    }
    Ok(())
}

/// Validate a forecast horizon: 1..=168 hours.
pub fn validate_horizon(hours: u32) -> Result<()> {
    if !(1..=168).contains(&hours) {
        return Err(SmartError::Input(format!(
            "horizon must be between 1 and 168 hours, got {hours}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_names() {
        assert!(validate_resource_name("failing-app-xyz").is_ok());
        assert!(validate_resource_name("a").is_ok());
        assert!(validate_resource_name("web-0").is_ok());
        assert!(validate_namespace("kube-system").is_ok());
        assert!(validate_context("gke_project_us-east1_cluster").is_ok());
    }

    #[test]
    fn rejects_invalid_names() {
        assert!(validate_resource_name("").is_err());
        assert!(validate_resource_name("-leading").is_err());
        assert!(validate_resource_name("UPPER").is_err());
        assert!(validate_resource_name(&"a".repeat(254)).is_err());
        assert!(validate_namespace("has.dots").is_err());
        assert!(validate_namespace(&"n".repeat(64)).is_err());
    }

    #[test]
    fn rejects_shell_metacharacters() {
        assert!(validate_resource_name("web;rm").is_err());
        assert!(validate_namespace("ns|x").is_err());
        assert!(validate_context("ctx$(boom)").is_err());
    }

    #[test]
    fn horizon_bounds_are_inclusive() {
        assert!(validate_horizon(0).is_err());
        assert!(validate_horizon(1).is_ok());
        assert!(validate_horizon(168).is_ok());
        assert!(validate_horizon(169).is_err());
    }
}
