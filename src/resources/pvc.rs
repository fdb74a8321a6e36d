//! PersistentVolumeClaim generation for PostgreSQL clusters.
//!
//! Emits a single-writer claim from the cluster's storage spec. The claim
//! spec is create-once: the upsert path never projects these fields onto a
//! live claim, and a desired-vs-live mismatch is surfaced as a condition.

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;

use crate::crd::PostgresCluster;
use crate::resources::common::{owner_reference, pvc_name, standard_labels};

/// Generate the PersistentVolumeClaim for a PostgresCluster.
///
/// Access mode is pinned to ReadWriteOnce: the data volume is attached to
/// a single writer.
pub fn generate_pvc(resource: &PostgresCluster) -> PersistentVolumeClaim {
    let labels = standard_labels(resource);

    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(pvc_name(resource)),
            namespace: resource.namespace(),
            labels: Some(labels),
            owner_references: Some(vec![owner_reference(resource)]),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: resource.spec.storage.storage_class.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some({
                    let mut requests = BTreeMap::new();
                    requests.insert(
                        "storage".to_string(),
                        Quantity(resource.spec.storage.size.clone()),
                    );
                    requests
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
