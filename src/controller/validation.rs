//! Spec validation for PostgresCluster resources.
//!
//! Validation runs before any child is mutated; a failure aborts the
//! pipeline and is reported through a status condition.

use crate::controller::error::Error;
use crate::crd::PostgresCluster;

/// Validate the resource spec.
pub fn validate_spec(resource: &PostgresCluster) -> Result<(), Error> {
    if resource.spec.version.trim().is_empty() {
        return Err(Error::Validation(
            "version must be a non-empty image reference".to_string(),
        ));
    }
    if let Some(replicas) = resource.spec.replicas {
        if replicas < 0 {
            return Err(Error::Validation(format!(
                "replicas must be non-negative, got {}",
                replicas
            )));
        }
    }
    if !is_quantity(&resource.spec.storage.size) {
        return Err(Error::Validation(format!(
            "storage size {:?} is not a valid quantity",
            resource.spec.storage.size
        )));
    }
    Ok(())
}

/// Minimal check that a string looks like a Kubernetes quantity
/// (digits, optional decimal point, optional unit suffix).
fn is_quantity(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() {
        return false;
    }
    let digits: String = value
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if digits.is_empty() || digits.parse::<f64>().is_err() {
        return false;
    }
    let suffix = &value[digits.len()..];
    matches!(
        suffix,
        "" | "Ki" | "Mi" | "Gi" | "Ti" | "Pi" | "Ei" | "k" | "M" | "G" | "T" | "P" | "E" | "m"
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::crd::{PostgresClusterSpec, StorageSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn test_resource(version: &str, replicas: Option<i32>, size: &str) -> PostgresCluster {
        PostgresCluster {
            metadata: ObjectMeta {
                name: Some("my-db".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: PostgresClusterSpec {
                version: version.to_string(),
                replicas,
                storage: StorageSpec {
                    storage_class: None,
                    size: size.to_string(),
                },
            },
            status: None,
        }
    }

    #[test]
    fn test_valid_spec() {
        assert!(validate_spec(&test_resource("postgres:14", Some(1), "10Gi")).is_ok());
        assert!(validate_spec(&test_resource("postgres:14", None, "500Mi")).is_ok());
        assert!(validate_spec(&test_resource("postgres:14", Some(0), "10Gi")).is_ok());
    }

    #[test]
    fn test_empty_version_rejected() {
        let err = validate_spec(&test_resource("", Some(1), "10Gi")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_negative_replicas_rejected() {
        let err = validate_spec(&test_resource("postgres:14", Some(-1), "10Gi")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_malformed_size_rejected() {
        assert!(validate_spec(&test_resource("postgres:14", Some(1), "")).is_err());
        assert!(validate_spec(&test_resource("postgres:14", Some(1), "lots")).is_err());
        assert!(validate_spec(&test_resource("postgres:14", Some(1), "10Xi")).is_err());
    }
}
