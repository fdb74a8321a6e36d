//! Service generation for PostgreSQL clusters.
//!
//! Creates a stable ClusterIP service exposing the data port. The service
//! selects pods by the cluster's identity labels, so it follows replica
//! membership automatically.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::crd::PostgresCluster;
use crate::resources::common::{
    POSTGRES_PORT, owner_reference, pod_selector_labels, service_name, standard_labels,
};

/// Generate the client Service for a PostgresCluster.
pub fn generate_service(resource: &PostgresCluster) -> Service {
    let labels = standard_labels(resource);

    Service {
        metadata: ObjectMeta {
            name: Some(service_name(resource)),
            namespace: resource.namespace(),
            labels: Some(labels),
            owner_references: Some(vec![owner_reference(resource)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(pod_selector_labels(resource)),
            ports: Some(vec![ServicePort {
                port: POSTGRES_PORT,
                target_port: Some(IntOrString::String("postgres".to_string())),
                name: Some("postgres".to_string()),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
