//! ConfigMap generation for PostgreSQL clusters.
//!
//! Emits the non-secret environment the workload consumes. Credentials are
//! never inlined here: the workload references the externally provisioned
//! credentials Secret by name.

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;

use crate::crd::PostgresCluster;
use crate::resources::common::{
    DATA_MOUNT_PATH, configmap_name, owner_reference, standard_labels,
};

/// Generate the ConfigMap for a PostgresCluster.
///
/// The database name follows the cluster name so that siblings in one
/// namespace never share a database identity. PGDATA points below the
/// mount path because the volume root holds a lost+found directory on
/// most provisioners.
pub fn generate_configmap(resource: &PostgresCluster) -> ConfigMap {
    let labels = standard_labels(resource);

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(configmap_name(resource)),
            namespace: resource.namespace(),
            labels: Some(labels),
            owner_references: Some(vec![owner_reference(resource)]),
            ..Default::default()
        },
        data: Some({
            let mut data = BTreeMap::new();
            data.insert("POSTGRES_DB".to_string(), resource.name_any());
            data.insert("PGDATA".to_string(), format!("{}/pgdata", DATA_MOUNT_PATH));
            data
        }),
        ..Default::default()
    }
}
