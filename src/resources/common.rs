//! Common resource generation utilities.
//!
//! Provides labels, deterministic child names, and owner references shared
//! by all resource builders.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use std::collections::BTreeMap;

use crate::crd::PostgresCluster;

/// PostgreSQL client port
pub const POSTGRES_PORT: i32 = 5432;

/// Data directory inside the container
pub const DATA_MOUNT_PATH: &str = "/var/lib/postgresql/data";

/// Standard labels applied to all managed resources
pub fn standard_labels(resource: &PostgresCluster) -> BTreeMap<String, String> {
    let mut labels = pod_selector_labels(resource);
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "postgres-operator".to_string(),
    );
    labels.insert(
        "app.kubernetes.io/component".to_string(),
        "database".to_string(),
    );
    labels
}

/// Selector labels scoped to the cluster identity.
///
/// These must stay stable for the life of the workload: the StatefulSet
/// selector is immutable, and the Service follows replica membership
/// through them. Scoping on the instance name keeps sibling clusters in
/// the same namespace from selecting each other's pods.
pub fn pod_selector_labels(resource: &PostgresCluster) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/name".to_string(),
        "postgres".to_string(),
    );
    labels.insert(
        "app.kubernetes.io/instance".to_string(),
        resource.name_any(),
    );
    labels
}

/// Create the controller owner reference for a PostgresCluster.
///
/// Every managed child carries this reference; it is the sole cleanup
/// mechanism, walked by the garbage collector to cascade deletion.
pub fn owner_reference(resource: &PostgresCluster) -> OwnerReference {
    OwnerReference {
        api_version: "postgresoperator.example.com/v1alpha1".to_string(),
        kind: "PostgresCluster".to_string(),
        name: resource.name_any(),
        uid: resource.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Name of the managed ConfigMap
pub fn configmap_name(resource: &PostgresCluster) -> String {
    format!("{}-postgres-config", resource.name_any())
}

/// Name of the managed PersistentVolumeClaim
pub fn pvc_name(resource: &PostgresCluster) -> String {
    format!("{}-postgres-data", resource.name_any())
}

/// Name of the managed client Service
pub fn service_name(resource: &PostgresCluster) -> String {
    format!("{}-postgres", resource.name_any())
}

/// Name of the managed StatefulSet
pub fn statefulset_name(resource: &PostgresCluster) -> String {
    format!("{}-postgres", resource.name_any())
}

/// Name of the externally provisioned credentials Secret.
///
/// The operator references this Secret by name only; its contents are
/// managed outside the operator.
pub fn credentials_secret_name(resource: &PostgresCluster) -> String {
    format!("{}-postgres-credentials", resource.name_any())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::crd::{PostgresClusterSpec, StorageSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn test_resource(name: &str) -> PostgresCluster {
        PostgresCluster {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                uid: Some("test-uid".to_string()),
                ..Default::default()
            },
            spec: PostgresClusterSpec {
                version: "postgres:16".to_string(),
                replicas: Some(1),
                storage: StorageSpec {
                    storage_class: None,
                    size: "10Gi".to_string(),
                },
            },
            status: None,
        }
    }

    #[test]
    fn test_child_names_are_deterministic() {
        let resource = test_resource("alpha");
        assert_eq!(configmap_name(&resource), "alpha-postgres-config");
        assert_eq!(pvc_name(&resource), "alpha-postgres-data");
        assert_eq!(service_name(&resource), "alpha-postgres");
        assert_eq!(statefulset_name(&resource), "alpha-postgres");
        // Same input, same output
        assert_eq!(configmap_name(&resource), configmap_name(&resource));
    }

    #[test]
    fn test_sibling_clusters_never_collide() {
        let a = test_resource("alpha");
        let b = test_resource("beta");
        let names_a = [
            configmap_name(&a),
            pvc_name(&a),
            service_name(&a),
            statefulset_name(&a),
        ];
        let names_b = [
            configmap_name(&b),
            pvc_name(&b),
            service_name(&b),
            statefulset_name(&b),
        ];
        for name in &names_a {
            assert!(!names_b.contains(name), "collision on {}", name);
        }
    }

    #[test]
    fn test_owner_reference_resolves_to_cluster() {
        let resource = test_resource("alpha");
        let owner = owner_reference(&resource);
        assert_eq!(owner.kind, "PostgresCluster");
        assert_eq!(owner.name, "alpha");
        assert_eq!(owner.uid, "test-uid");
        assert_eq!(owner.controller, Some(true));
        assert_eq!(owner.block_owner_deletion, Some(true));
    }

    #[test]
    fn test_selector_labels_scoped_to_instance() {
        let a = test_resource("alpha");
        let b = test_resource("beta");
        assert_ne!(pod_selector_labels(&a), pod_selector_labels(&b));
        assert_eq!(
            pod_selector_labels(&a).get("app.kubernetes.io/instance"),
            Some(&"alpha".to_string())
        );
    }
}
