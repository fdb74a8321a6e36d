//! StatefulSet generation for PostgreSQL clusters.
//!
//! Creates the replicated workload:
//! - Container image taken from the cluster's `version`
//! - Replica count from `replicas` (default 1)
//! - Data volume bound to the managed claim
//! - Environment sourced from the managed ConfigMap, password from the
//!   externally provisioned credentials Secret
//! - Selector and template labels scoped to the cluster identity

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Capabilities, ConfigMapEnvSource, Container, ContainerPort, EnvFromSource, EnvVar,
    EnvVarSource, ExecAction, PersistentVolumeClaimVolumeSource, PodSecurityContext, PodSpec,
    PodTemplateSpec, Probe, SeccompProfile, SecretKeySelector, SecurityContext, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;
use std::collections::BTreeMap;

use crate::crd::PostgresCluster;
use crate::resources::common::{
    DATA_MOUNT_PATH, POSTGRES_PORT, configmap_name, credentials_secret_name, owner_reference,
    pod_selector_labels, pvc_name, service_name, standard_labels, statefulset_name,
};

/// PostgreSQL user ID in the official container image
const POSTGRES_USER_ID: i64 = 999;
/// Termination grace period, allows a clean shutdown checkpoint
const TERMINATION_GRACE_PERIOD: i64 = 60;
/// Name of the data volume within the pod
const DATA_VOLUME: &str = "data";

/// Generate a StatefulSet for a PostgresCluster.
pub fn generate_statefulset(resource: &PostgresCluster) -> StatefulSet {
    let labels = standard_labels(resource);
    let replicas = resource.spec.effective_replicas();

    StatefulSet {
        metadata: ObjectMeta {
            name: Some(statefulset_name(resource)),
            namespace: resource.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(resource)]),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(replicas),
            service_name: Some(service_name(resource)),
            selector: LabelSelector {
                match_labels: Some(pod_selector_labels(resource)),
                ..Default::default()
            },
            template: generate_pod_template(resource, &labels),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Generate the pod template for the StatefulSet.
fn generate_pod_template(
    resource: &PostgresCluster,
    labels: &BTreeMap<String, String>,
) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels.clone()),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            termination_grace_period_seconds: Some(TERMINATION_GRACE_PERIOD),
            security_context: Some(generate_pod_security_context()),
            containers: vec![generate_postgres_container(resource)],
            volumes: Some(vec![Volume {
                name: DATA_VOLUME.to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: pvc_name(resource),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

/// Generate pod security context.
fn generate_pod_security_context() -> PodSecurityContext {
    PodSecurityContext {
        run_as_non_root: Some(true),
        run_as_user: Some(POSTGRES_USER_ID),
        fs_group: Some(POSTGRES_USER_ID),
        seccomp_profile: Some(SeccompProfile {
            type_: "RuntimeDefault".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Generate the main PostgreSQL container.
fn generate_postgres_container(resource: &PostgresCluster) -> Container {
    Container {
        name: "postgres".to_string(),
        image: Some(resource.spec.version.clone()),
        ports: Some(vec![ContainerPort {
            container_port: POSTGRES_PORT,
            name: Some("postgres".to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env_from: Some(vec![EnvFromSource {
            config_map_ref: Some(ConfigMapEnvSource {
                name: configmap_name(resource),
                optional: Some(false),
            }),
            ..Default::default()
        }]),
        env: Some(generate_env_vars(resource)),
        volume_mounts: Some(vec![VolumeMount {
            name: DATA_VOLUME.to_string(),
            mount_path: DATA_MOUNT_PATH.to_string(),
            ..Default::default()
        }]),
        security_context: Some(generate_container_security_context()),
        liveness_probe: Some(generate_liveness_probe()),
        readiness_probe: Some(generate_readiness_probe()),
        ..Default::default()
    }
}

/// Generate environment variables for the PostgreSQL container.
///
/// The password comes from the credentials Secret, referenced by name;
/// the Secret itself is provisioned outside the operator.
fn generate_env_vars(resource: &PostgresCluster) -> Vec<EnvVar> {
    vec![
        EnvVar {
            name: "POSTGRES_USER".to_string(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: credentials_secret_name(resource),
                    key: "username".to_string(),
                    optional: Some(false),
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
        EnvVar {
            name: "POSTGRES_PASSWORD".to_string(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: credentials_secret_name(resource),
                    key: "password".to_string(),
                    optional: Some(false),
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
    ]
}

/// Generate container security context.
fn generate_container_security_context() -> SecurityContext {
    SecurityContext {
        allow_privilege_escalation: Some(false),
        run_as_non_root: Some(true),
        capabilities: Some(Capabilities {
            drop: Some(vec!["ALL".to_string()]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Liveness probe: the server process answers on the local socket.
fn generate_liveness_probe() -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(vec![
                "pg_isready".to_string(),
                "-h".to_string(),
                "127.0.0.1".to_string(),
            ]),
        }),
        initial_delay_seconds: Some(30),
        period_seconds: Some(10),
        timeout_seconds: Some(5),
        failure_threshold: Some(6),
        ..Default::default()
    }
}

/// Readiness probe: faster cadence so the service tracks membership closely.
fn generate_readiness_probe() -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(vec![
                "pg_isready".to_string(),
                "-h".to_string(),
                "127.0.0.1".to_string(),
            ]),
        }),
        initial_delay_seconds: Some(5),
        period_seconds: Some(5),
        timeout_seconds: Some(3),
        failure_threshold: Some(3),
        ..Default::default()
    }
}
