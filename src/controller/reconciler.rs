//! Reconciliation loop for PostgresCluster.
//!
//! Each invocation drives a fixed pipeline: validate, ensure the
//! configuration object, the storage claim, the network endpoint, and the
//! workload, then aggregate status. Every stage is an idempotent upsert,
//! so the pipeline is stateless and safe to resume from the first stage
//! after any failure. Deletion is not handled here at all: children are
//! cleaned up by the garbage collector walking their owner references.

use std::sync::Arc;
use std::time::{Duration, Instant};

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};
use kube::{Api, ResourceExt, runtime::controller::Action};
use tracing::{debug, error, info, warn};

use crate::{
    controller::{
        context::Context,
        error::{BackoffConfig, Error},
        status,
        upsert::{self, Outcome},
        validation,
    },
    crd::{ClusterPhase, Condition, PostgresCluster},
    resources::{configmap, pvc, service, statefulset},
};

/// Field manager name for server-side apply
pub const FIELD_MANAGER: &str = "postgres-operator";

/// Reconcile a PostgresCluster
///
/// This is the main reconciliation function called by the controller.
pub async fn reconcile(obj: Arc<PostgresCluster>, ctx: Arc<Context>) -> Result<Action, Error> {
    let start_time = Instant::now();
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    debug!(name = %name, namespace = %namespace, "Reconciling PostgresCluster");

    let api: Api<PostgresCluster> = Api::namespaced(ctx.client.clone(), &namespace);

    // The object is going away; its children follow through the garbage
    // collector, so there is no work left for this invocation.
    if obj.metadata.deletion_timestamp.is_some() {
        debug!(name = %name, "Deletion in progress, cascade handles children");
        return Ok(Action::await_change());
    }

    // Validate before touching any child.
    if let Err(e) = validation::validate_spec(&obj) {
        error!(name = %name, error = %e, "Validation failed");
        ctx.publish_warning_event(&obj, "ValidationFailed", "Validating", Some(e.to_string()))
            .await;
        record_failure(&api, &obj, &e).await;
        return Err(e);
    }

    let result = run_pipeline(&obj, &ctx, &namespace, &api).await;

    // Record metrics
    if let Some(ref health_state) = ctx.health_state {
        let duration = start_time.elapsed().as_secs_f64();
        health_state
            .metrics
            .record_reconcile(&namespace, &name, duration);
    }

    match result {
        Ok(action) => Ok(action),
        Err(e) => {
            record_failure(&api, &obj, &e).await;
            Err(e)
        }
    }
}

/// Execute the ensure pipeline and aggregate status.
async fn run_pipeline(
    obj: &PostgresCluster,
    ctx: &Context,
    namespace: &str,
    api: &Api<PostgresCluster>,
) -> Result<Action, Error> {
    let name = obj.name_any();

    // 1. Configuration
    let cm_api: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), namespace);
    let outcome = upsert::ensure(&cm_api, &configmap::generate_configmap(obj)).await?;
    report_outcome(obj, ctx, outcome, "ConfigMap").await;

    // 2. Storage. The claim spec is create-once: a desired change to class,
    // capacity, or access mode is reported, never applied.
    let pvc_api: Api<PersistentVolumeClaim> = Api::namespaced(ctx.client.clone(), namespace);
    let desired_pvc = pvc::generate_pvc(obj);
    let storage_violation = check_storage_consistency(&pvc_api, obj, &desired_pvc).await?;
    if let Some(ref condition) = storage_violation {
        warn!(name = %name, message = %condition.message, "Storage spec mismatch");
        if !previously_inconsistent(obj) {
            ctx.publish_warning_event(
                obj,
                "ImmutableStorage",
                "EnsureStorage",
                Some(condition.message.clone()),
            )
            .await;
        }
    }
    let outcome = upsert::ensure(&pvc_api, &desired_pvc).await?;
    report_outcome(obj, ctx, outcome, "PersistentVolumeClaim").await;

    // 3. Network
    let svc_api: Api<Service> = Api::namespaced(ctx.client.clone(), namespace);
    let outcome = upsert::ensure(&svc_api, &service::generate_service(obj)).await?;
    report_outcome(obj, ctx, outcome, "Service").await;

    // 4. Workload
    let sts_api: Api<StatefulSet> = Api::namespaced(ctx.client.clone(), namespace);
    let outcome = upsert::ensure(&sts_api, &statefulset::generate_statefulset(obj)).await?;
    report_outcome(obj, ctx, outcome, "StatefulSet").await;

    // 5. Status
    let observed = status::observe_children(&ctx.client, namespace, obj).await?;
    let new_status = status::build_status(
        &observed,
        obj.metadata.generation,
        storage_violation.into_iter().collect(),
    );
    if status::status_changed(obj.status.as_ref(), &new_status) {
        debug!(name = %name, phase = %new_status.phase, "Updating status");
        status::publish_status(api, &name, &new_status).await?;
    }

    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.set_resource_replicas(
            namespace,
            &name,
            i64::from(new_status.target_replicas.unwrap_or(0)),
            i64::from(new_status.ready_replicas),
        );
    }

    // Periodic drift correction even without change notifications
    let requeue_duration = match new_status.phase {
        ClusterPhase::Running => Duration::from_secs(60),
        ClusterPhase::Pending | ClusterPhase::Creating => Duration::from_secs(10),
        ClusterPhase::Degraded => Duration::from_secs(30),
        ClusterPhase::Failed => Duration::from_secs(300),
    };

    Ok(Action::requeue(requeue_duration))
}

/// Error policy for the controller
pub fn error_policy(obj: Arc<PostgresCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    // Record error metric
    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_error(&namespace, &name);
    }

    if error.is_not_found() {
        // The desired object vanished mid-pipeline: success, no retry.
        debug!(name = %name, "Resource not found (likely deleted)");
        return Action::await_change();
    }

    if error.is_forbidden() {
        // Manual intervention expected; keep retrying slowly, never drop.
        error!(name = %name, error = %error, "Authorization error, retrying at slow interval");
        return Action::requeue(Duration::from_secs(300));
    }

    if error.is_conflict() {
        // Already retried within the invocation; another writer is active.
        warn!(name = %name, error = %error, "Update conflict, requeueing shortly");
        return Action::requeue(Duration::from_secs(5));
    }

    let retry_count = obj
        .status
        .as_ref()
        .and_then(|s| s.retry_count)
        .unwrap_or(0);
    let delay = BackoffConfig::default().delay_for(retry_count);

    if error.is_retryable() {
        warn!(name = %name, error = %error, retry_count, "Retryable error, backing off");
    } else {
        // Permanent until the spec changes; backoff instead of busy-looping.
        error!(name = %name, error = %error, retry_count, "Non-retryable error, backing off");
    }
    Action::requeue(delay)
}

/// Publish a creation event and log non-trivial outcomes.
async fn report_outcome(obj: &PostgresCluster, ctx: &Context, outcome: Outcome, kind: &str) {
    match outcome {
        Outcome::Created => {
            ctx.publish_normal_event(
                obj,
                "Created",
                "EnsureResources",
                Some(format!("Created {}", kind)),
            )
            .await;
        }
        Outcome::Updated => {
            info!(name = %obj.name_any(), kind = %kind, "Converged resource");
        }
        Outcome::Unchanged => {}
    }
}

/// Compare the desired claim against the live one for create-once fields.
///
/// Returns the condition to record when they diverge; absent claims and
/// matching claims yield no condition.
async fn check_storage_consistency(
    api: &Api<PersistentVolumeClaim>,
    obj: &PostgresCluster,
    desired: &PersistentVolumeClaim,
) -> Result<Option<Condition>, Error> {
    let name = desired
        .metadata
        .name
        .clone()
        .ok_or_else(|| Error::MissingField("metadata.name".to_string()))?;

    let live = match api.get(&name).await {
        Ok(live) => live,
        Err(kube::Error::Api(e)) if e.code == 404 => return Ok(None),
        Err(e) => return Err(Error::Kube(e)),
    };

    let live_spec = live.spec.unwrap_or_default();
    let desired_spec = desired.spec.clone().unwrap_or_default();
    let mut mismatches = Vec::new();

    // Only compare the class when the spec pins one; an unset class means
    // the platform default, which the live claim records explicitly.
    if let Some(desired_class) = &desired_spec.storage_class_name {
        if live_spec.storage_class_name.as_ref() != Some(desired_class) {
            mismatches.push(format!(
                "storageClass {} (live {})",
                desired_class,
                live_spec.storage_class_name.as_deref().unwrap_or("<none>")
            ));
        }
    }
    let desired_request = desired_spec
        .resources
        .as_ref()
        .and_then(|r| r.requests.as_ref())
        .and_then(|r| r.get("storage"));
    let live_request = live_spec
        .resources
        .as_ref()
        .and_then(|r| r.requests.as_ref())
        .and_then(|r| r.get("storage"));
    if desired_request != live_request {
        mismatches.push(format!(
            "size {} (live {})",
            desired_request.map_or("<none>", |q| q.0.as_str()),
            live_request.map_or("<none>", |q| q.0.as_str())
        ));
    }
    if live_spec.access_modes != desired_spec.access_modes {
        mismatches.push("accessModes".to_string());
    }

    if mismatches.is_empty() {
        return Ok(None);
    }
    Ok(Some(Condition::storage_consistent(
        false,
        "ImmutableField",
        &format!(
            "storage claim fields cannot change after creation: {}",
            mismatches.join(", ")
        ),
        obj.metadata.generation,
    )))
}

/// Whether the last persisted status already flags the storage mismatch.
fn previously_inconsistent(obj: &PostgresCluster) -> bool {
    obj.status.as_ref().is_some_and(|s| {
        s.conditions
            .iter()
            .any(|c| c.r#type == "StorageConsistent" && c.status == "False")
    })
}

/// Record failure bookkeeping in status: the retry counter drives requeue
/// backoff, and the condition makes the failure visible to users.
async fn record_failure(api: &Api<PostgresCluster>, obj: &PostgresCluster, error: &Error) {
    let name = obj.name_any();
    let generation = obj.metadata.generation;
    let retry_count = obj
        .status
        .as_ref()
        .and_then(|s| s.retry_count)
        .unwrap_or(0)
        .saturating_add(1);

    let mut builder = status::ConditionBuilder::new();
    for condition in obj.status.as_ref().map(|s| s.conditions.as_slice()).unwrap_or_default() {
        builder.set(condition.clone());
    }
    match error {
        Error::Validation(message) => {
            builder.set(Condition::spec_valid(
                false,
                "InvalidSpec",
                message,
                generation,
            ));
        }
        _ => {
            builder.ready(false, "ReconcileFailed", &error.to_string(), generation);
        }
    }

    let patch = serde_json::json!({
        "status": {
            "retryCount": retry_count,
            "lastError": error.to_string(),
            "conditions": builder.build(),
        }
    });
    if let Err(e) = api
        .patch_status(
            &name,
            &kube::api::PatchParams::apply(FIELD_MANAGER),
            &kube::api::Patch::Merge(&patch),
        )
        .await
    {
        // Status is best-effort on the failure path; the error itself
        // still propagates to the error policy.
        warn!(name = %name, error = %e, "Failed to record failure status");
    }
}
