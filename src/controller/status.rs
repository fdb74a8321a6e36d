//! Status aggregation and condition management.
//!
//! The aggregator reads the live state of each managed child and derives
//! an observed status. The derivation is pure: nothing in the produced
//! status comes from the desired spec, only from what the children report.
//! The status is written back only when it differs from the last persisted
//! value, to avoid update churn re-triggering the watch loop.

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};

use crate::controller::context::FIELD_MANAGER;
use crate::controller::error::Error;
use crate::crd::{ClusterPhase, Condition, PostgresCluster, PostgresClusterStatus};
use crate::resources::common::{POSTGRES_PORT, pvc_name, service_name, statefulset_name};

/// Live state observed from the managed children during one reconcile.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObservedChildren {
    /// Replica count the live workload is converging to, if it exists
    pub target_replicas: Option<i32>,
    /// Ready replicas reported by the live workload
    pub ready_replicas: i32,
    /// Current replicas reported by the live workload
    pub current_replicas: i32,
    /// Phase of the live storage claim
    pub storage_phase: Option<String>,
    /// Client endpoint derived from the live service
    pub endpoint: Option<String>,
}

/// Read the live state of each managed child.
///
/// A child that does not exist yet observes as absent rather than an
/// error; only infrastructure failures propagate.
pub async fn observe_children(
    client: &Client,
    namespace: &str,
    resource: &PostgresCluster,
) -> Result<ObservedChildren, Error> {
    let mut observed = ObservedChildren::default();

    let sts_api: Api<StatefulSet> = Api::namespaced(client.clone(), namespace);
    match sts_api.get(&statefulset_name(resource)).await {
        Ok(sts) => {
            observed.target_replicas = sts.spec.as_ref().and_then(|s| s.replicas);
            if let Some(status) = sts.status {
                observed.ready_replicas = status.ready_replicas.unwrap_or(0);
                observed.current_replicas = status.current_replicas.unwrap_or(0);
            }
        }
        Err(kube::Error::Api(e)) if e.code == 404 => {}
        Err(e) => return Err(Error::Kube(e)),
    }

    let pvc_api: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), namespace);
    match pvc_api.get(&pvc_name(resource)).await {
        Ok(pvc) => {
            observed.storage_phase = pvc.status.and_then(|s| s.phase);
        }
        Err(kube::Error::Api(e)) if e.code == 404 => {}
        Err(e) => return Err(Error::Kube(e)),
    }

    let svc_api: Api<Service> = Api::namespaced(client.clone(), namespace);
    match svc_api.get(&service_name(resource)).await {
        Ok(svc) => {
            observed.endpoint = svc
                .spec
                .and_then(|s| s.cluster_ip)
                .filter(|ip| !ip.is_empty() && ip != "None")
                .map(|ip| format!("{}:{}", ip, POSTGRES_PORT));
        }
        Err(kube::Error::Api(e)) if e.code == 404 => {}
        Err(e) => return Err(Error::Kube(e)),
    }

    Ok(observed)
}

/// Derive the cluster status from observed child state.
///
/// Pure function over the observation: the phase compares ready replicas
/// against the live workload's own target, never against the desired spec.
/// Extra conditions (validation, storage consistency) are merged in by the
/// caller via `extra_conditions`.
pub fn build_status(
    observed: &ObservedChildren,
    generation: Option<i64>,
    extra_conditions: Vec<Condition>,
) -> PostgresClusterStatus {
    let phase = match observed.target_replicas {
        None => ClusterPhase::Pending,
        Some(target) => {
            if observed.ready_replicas >= target {
                ClusterPhase::Running
            } else if observed.current_replicas == 0 && observed.ready_replicas == 0 {
                ClusterPhase::Creating
            } else {
                ClusterPhase::Degraded
            }
        }
    };

    let mut builder = ConditionBuilder::new();
    match phase {
        ClusterPhase::Running => {
            builder.ready(true, "AllReplicasReady", "All replicas are ready", generation);
            builder.progressing(false, "ReconcileComplete", "Cluster converged", generation);
        }
        ClusterPhase::Degraded => {
            builder.ready(false, "ReplicasUnavailable", "Some replicas are not ready", generation);
            builder.degraded(true, "ReplicasUnavailable", "Some replicas are not ready", generation);
        }
        _ => {
            builder.ready(false, "Reconciling", "Resources are converging", generation);
            builder.progressing(true, "Reconciling", &format!("Phase: {}", phase), generation);
        }
    }
    for condition in extra_conditions {
        builder.set(condition);
    }

    PostgresClusterStatus {
        phase,
        ready_replicas: observed.ready_replicas,
        current_replicas: observed.current_replicas,
        target_replicas: observed.target_replicas,
        storage_phase: observed.storage_phase.clone(),
        endpoint: observed.endpoint.clone(),
        observed_generation: generation,
        conditions: builder.build(),
        retry_count: None,
        last_error: None,
    }
}

/// Check whether a newly computed status differs from the persisted one.
///
/// Condition timestamps are ignored so that an otherwise identical status
/// does not churn the object on every cycle.
pub fn status_changed(old: Option<&PostgresClusterStatus>, new: &PostgresClusterStatus) -> bool {
    let Some(old) = old else {
        return true;
    };
    if old.phase != new.phase
        || old.ready_replicas != new.ready_replicas
        || old.current_replicas != new.current_replicas
        || old.target_replicas != new.target_replicas
        || old.storage_phase != new.storage_phase
        || old.endpoint != new.endpoint
        || old.observed_generation != new.observed_generation
        || old.retry_count != new.retry_count
        || old.last_error != new.last_error
    {
        return true;
    }
    if old.conditions.len() != new.conditions.len() {
        return true;
    }
    old.conditions.iter().zip(&new.conditions).any(|(a, b)| {
        a.r#type != b.r#type || a.status != b.status || a.reason != b.reason || a.message != b.message
    })
}

/// Write the status subresource.
pub async fn publish_status(
    api: &Api<PostgresCluster>,
    name: &str,
    status: &PostgresClusterStatus,
) -> Result<(), Error> {
    let patch = serde_json::json!({ "status": status });
    api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Builder for managing conditions list
pub struct ConditionBuilder {
    conditions: Vec<Condition>,
}

impl ConditionBuilder {
    /// Create a new condition builder
    pub fn new() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }

    /// Add or update a condition
    pub fn set(&mut self, condition: Condition) -> &mut Self {
        // Find and replace existing condition of same type
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition.r#type)
        {
            *existing = condition;
        } else {
            self.conditions.push(condition);
        }
        self
    }

    /// Set Ready condition
    pub fn ready(
        &mut self,
        ready: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> &mut Self {
        self.set(Condition::ready(ready, reason, message, generation))
    }

    /// Set Progressing condition
    pub fn progressing(
        &mut self,
        progressing: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> &mut Self {
        self.set(Condition::progressing(
            progressing,
            reason,
            message,
            generation,
        ))
    }

    /// Set Degraded condition
    pub fn degraded(
        &mut self,
        degraded: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> &mut Self {
        self.set(Condition::degraded(degraded, reason, message, generation))
    }

    /// Build the conditions list
    pub fn build(self) -> Vec<Condition> {
        self.conditions
    }
}

impl Default for ConditionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if a condition type is true
pub fn is_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    conditions
        .iter()
        .find(|c| c.r#type == condition_type)
        .is_some_and(|c| c.status == "True")
}

/// Get the reason for a condition
pub fn get_condition_reason<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a str> {
    conditions
        .iter()
        .find(|c| c.r#type == condition_type)
        .map(|c| c.reason.as_str())
}
