//! Unit tests for postgres-operator.
//!
//! These tests run without a Kubernetes cluster and exercise the pure
//! surface of the crate: CRD types, error classification, the upsert
//! projections, and status aggregation.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use postgres_operator::crd::{PostgresCluster, PostgresClusterSpec, StorageSpec};

fn cluster(name: &str, replicas: Option<i32>, version: &str) -> PostgresCluster {
    PostgresCluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            uid: Some(format!("{}-uid", name)),
            generation: Some(1),
            ..Default::default()
        },
        spec: PostgresClusterSpec {
            version: version.to_string(),
            replicas,
            storage: StorageSpec {
                storage_class: Some("standard".to_string()),
                size: "10Gi".to_string(),
            },
        },
        status: None,
    }
}

mod crd_tests {
    use super::*;
    use postgres_operator::crd::{ClusterPhase, Condition};

    #[test]
    fn test_phase_display() {
        assert_eq!(ClusterPhase::Pending.to_string(), "Pending");
        assert_eq!(ClusterPhase::Creating.to_string(), "Creating");
        assert_eq!(ClusterPhase::Running.to_string(), "Running");
        assert_eq!(ClusterPhase::Degraded.to_string(), "Degraded");
        assert_eq!(ClusterPhase::Failed.to_string(), "Failed");
    }

    #[test]
    fn test_phase_default() {
        assert_eq!(ClusterPhase::default(), ClusterPhase::Pending);
    }

    #[test]
    fn test_effective_replicas_default() {
        assert_eq!(cluster("a", None, "postgres:16").spec.effective_replicas(), 1);
        assert_eq!(
            cluster("a", Some(3), "postgres:16").spec.effective_replicas(),
            3
        );
    }

    #[test]
    fn test_condition_ready() {
        let condition = Condition::ready(true, "AllReady", "All components ready", Some(1));
        assert_eq!(condition.r#type, "Ready");
        assert_eq!(condition.status, "True");
        assert_eq!(condition.reason, "AllReady");
        assert_eq!(condition.observed_generation, Some(1));
    }

    #[test]
    fn test_condition_spec_valid() {
        let condition = Condition::spec_valid(false, "InvalidSpec", "version is empty", Some(2));
        assert_eq!(condition.r#type, "SpecValid");
        assert_eq!(condition.status, "False");
    }

    #[test]
    fn test_condition_storage_consistent() {
        let condition =
            Condition::storage_consistent(false, "ImmutableField", "class changed", None);
        assert_eq!(condition.r#type, "StorageConsistent");
        assert_eq!(condition.status, "False");
    }
}

mod builder_tests {
    use super::*;
    use postgres_operator::resources::{configmap, pvc, service, statefulset};

    #[test]
    fn test_all_children_owned_by_cluster() {
        let resource = cluster("prod", Some(1), "postgres:14");

        let owners = [
            configmap::generate_configmap(&resource)
                .metadata
                .owner_references,
            pvc::generate_pvc(&resource).metadata.owner_references,
            service::generate_service(&resource).metadata.owner_references,
            statefulset::generate_statefulset(&resource)
                .metadata
                .owner_references,
        ];
        for owner_refs in owners {
            let owner_refs = owner_refs.expect("owner references missing");
            assert_eq!(owner_refs.len(), 1);
            let owner = owner_refs.first().expect("empty owner references");
            assert_eq!(owner.kind, "PostgresCluster");
            assert_eq!(owner.name, "prod");
            assert_eq!(owner.uid, "prod-uid");
            assert_eq!(owner.controller, Some(true));
        }
    }

    #[test]
    fn test_builders_are_deterministic() {
        let resource = cluster("prod", Some(2), "postgres:14");
        assert_eq!(
            configmap::generate_configmap(&resource),
            configmap::generate_configmap(&resource)
        );
        assert_eq!(pvc::generate_pvc(&resource), pvc::generate_pvc(&resource));
        assert_eq!(
            service::generate_service(&resource),
            service::generate_service(&resource)
        );
        assert_eq!(
            statefulset::generate_statefulset(&resource),
            statefulset::generate_statefulset(&resource)
        );
    }

    #[test]
    fn test_distinct_clusters_produce_distinct_names() {
        let a = cluster("alpha", Some(1), "postgres:14");
        let b = cluster("beta", Some(1), "postgres:14");

        let names = |r: &PostgresCluster| {
            vec![
                configmap::generate_configmap(r).metadata.name,
                pvc::generate_pvc(r).metadata.name,
                service::generate_service(r).metadata.name,
                statefulset::generate_statefulset(r).metadata.name,
            ]
        };
        for name in names(&a) {
            assert!(!names(&b).contains(&name));
        }
    }
}

mod error_tests {
    use postgres_operator::controller::error::{BackoffConfig, Error};
    use std::time::Duration;

    #[test]
    fn test_error_is_retryable() {
        let kube_err = Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "timeout".to_string(),
            reason: "Timeout".to_string(),
            code: 504,
        }));
        assert!(kube_err.is_retryable());

        let validation_err = Error::Validation("invalid spec".to_string());
        assert!(!validation_err.is_retryable());

        let transient_err = Error::Transient("temporary failure".to_string());
        assert!(transient_err.is_retryable());

        let conflict_err = Error::Conflict("lost update".to_string());
        assert!(conflict_err.is_retryable());
        assert!(conflict_err.is_conflict());
    }

    #[test]
    fn test_backoff_is_capped() {
        let backoff = BackoffConfig::default();
        assert!(backoff.delay_for(0) < backoff.delay_for(3));
        assert_eq!(backoff.delay_for(100), Duration::from_secs(300));
    }
}

mod upsert_tests {
    use super::*;
    use k8s_openapi::api::apps::v1::StatefulSet;
    use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};
    use postgres_operator::controller::upsert::{ManagedObject, ResourceKind};
    use postgres_operator::resources::{configmap, pvc, service, statefulset};

    #[test]
    fn test_closed_kind_set() {
        assert_eq!(ConfigMap::KIND, ResourceKind::Configuration);
        assert_eq!(PersistentVolumeClaim::KIND, ResourceKind::Storage);
        assert_eq!(Service::KIND, ResourceKind::Network);
        assert_eq!(StatefulSet::KIND, ResourceKind::Workload);
    }

    #[test]
    fn test_second_reconcile_is_a_no_op() {
        // Unchanged desired state must produce zero diffs across all kinds.
        let resource = cluster("prod", Some(1), "postgres:14");

        let desired = configmap::generate_configmap(&resource);
        let mut live = desired.clone();
        assert!(!ConfigMap::project(&desired, &mut live));

        let desired = pvc::generate_pvc(&resource);
        let mut live = desired.clone();
        assert!(!PersistentVolumeClaim::project(&desired, &mut live));

        let desired = service::generate_service(&resource);
        let mut live = desired.clone();
        assert!(!Service::project(&desired, &mut live));

        let desired = statefulset::generate_statefulset(&resource);
        let mut live = desired.clone();
        assert!(!StatefulSet::project(&desired, &mut live));
    }

    #[test]
    fn test_scale_up_targets_only_workload_replicas() {
        // replicas 1 -> 3: exactly one kind reports a diff, and the diff is
        // the replica field.
        let before = cluster("prod", Some(1), "postgres:14");
        let after = cluster("prod", Some(3), "postgres:14");

        let mut live_cm = configmap::generate_configmap(&before);
        assert!(!ConfigMap::project(
            &configmap::generate_configmap(&after),
            &mut live_cm
        ));
        let mut live_pvc = pvc::generate_pvc(&before);
        assert!(!PersistentVolumeClaim::project(
            &pvc::generate_pvc(&after),
            &mut live_pvc
        ));
        let mut live_svc = service::generate_service(&before);
        assert!(!Service::project(
            &service::generate_service(&after),
            &mut live_svc
        ));

        let mut live_sts = statefulset::generate_statefulset(&before);
        assert!(StatefulSet::project(
            &statefulset::generate_statefulset(&after),
            &mut live_sts
        ));
        assert_eq!(live_sts.spec.expect("spec").replicas, Some(3));
    }

    #[test]
    fn test_version_rollout_updates_image() {
        let before = cluster("prod", Some(1), "postgres:14");
        let after = cluster("prod", Some(1), "postgres:16");

        let mut live = statefulset::generate_statefulset(&before);
        assert!(StatefulSet::project(
            &statefulset::generate_statefulset(&after),
            &mut live
        ));
        let image = live
            .spec
            .expect("spec")
            .template
            .spec
            .expect("pod spec")
            .containers
            .first()
            .expect("container")
            .image
            .clone();
        assert_eq!(image, Some("postgres:16".to_string()));
    }

    #[test]
    fn test_storage_change_never_projected() {
        // A storage class change after creation must leave the live claim
        // spec untouched; it is reported through a condition instead.
        let before = cluster("prod", Some(1), "postgres:14");
        let mut after = cluster("prod", Some(1), "postgres:14");
        after.spec.storage.storage_class = Some("fast-ssd".to_string());

        let mut live = pvc::generate_pvc(&before);
        let live_spec = live.spec.clone();
        PersistentVolumeClaim::project(&pvc::generate_pvc(&after), &mut live);
        assert_eq!(live.spec, live_spec);
    }
}

mod status_tests {
    use postgres_operator::controller::status::{
        ConditionBuilder, ObservedChildren, build_status, is_condition_true, status_changed,
    };
    use postgres_operator::crd::{ClusterPhase, Condition};

    fn observed(target: Option<i32>, ready: i32, current: i32) -> ObservedChildren {
        ObservedChildren {
            target_replicas: target,
            ready_replicas: ready,
            current_replicas: current,
            storage_phase: Some("Bound".to_string()),
            endpoint: Some("10.96.0.10:5432".to_string()),
        }
    }

    #[test]
    fn test_status_derived_from_live_children_only() {
        let status = build_status(&observed(Some(3), 3, 3), Some(4), Vec::new());
        assert_eq!(status.phase, ClusterPhase::Running);
        assert_eq!(status.ready_replicas, 3);
        assert_eq!(status.target_replicas, Some(3));
        assert_eq!(status.storage_phase, Some("Bound".to_string()));
        assert_eq!(status.endpoint, Some("10.96.0.10:5432".to_string()));
        assert_eq!(status.observed_generation, Some(4));
    }

    #[test]
    fn test_unchanged_status_is_not_rewritten() {
        let a = build_status(&observed(Some(1), 1, 1), Some(1), Vec::new());
        let b = build_status(&observed(Some(1), 1, 1), Some(1), Vec::new());
        assert!(!status_changed(Some(&a), &b));

        let c = build_status(&observed(Some(1), 0, 1), Some(1), Vec::new());
        assert!(status_changed(Some(&a), &c));
    }

    #[test]
    fn test_immutable_violation_surfaces_as_condition() {
        let violation =
            Condition::storage_consistent(false, "ImmutableField", "class changed", Some(1));
        let status = build_status(&observed(Some(1), 1, 1), Some(1), vec![violation]);
        assert!(!is_condition_true(&status.conditions, "StorageConsistent"));
        // The healthy conditions are still present alongside
        assert!(is_condition_true(&status.conditions, "Ready"));
    }

    #[test]
    fn test_condition_builder_dedup() {
        let mut builder = ConditionBuilder::new();
        builder.ready(false, "Starting", "starting", Some(1));
        builder.ready(true, "AllReady", "ready", Some(1));
        assert_eq!(builder.build().len(), 1);
    }
}

mod validation_tests {
    use super::*;
    use postgres_operator::controller::error::Error;
    use postgres_operator::controller::validation::validate_spec;

    #[test]
    fn test_empty_version_aborts_before_mutation() {
        let resource = cluster("prod", Some(1), "");
        let err = validate_spec(&resource).expect_err("empty version must fail");
        assert!(matches!(err, Error::Validation(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_valid_spec_passes() {
        assert!(validate_spec(&cluster("prod", Some(1), "postgres:14")).is_ok());
        assert!(validate_spec(&cluster("prod", None, "postgres:14")).is_ok());
    }
}
