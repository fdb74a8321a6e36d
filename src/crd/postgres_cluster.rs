//! PostgresCluster Custom Resource Definition.
//!
//! Defines the PostgresCluster CRD for deploying PostgreSQL on Kubernetes.
//! The spec is the desired state written by users; the status section is
//! entirely derived from the live children and never feeds back into the
//! desired state.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// PostgresCluster is a custom resource for deploying PostgreSQL.
///
/// Example:
/// ```yaml
/// apiVersion: postgresoperator.example.com/v1alpha1
/// kind: PostgresCluster
/// metadata:
///   name: my-db
/// spec:
///   version: postgres:16
///   replicas: 1
///   storage:
///     size: 10Gi
///     storageClass: standard
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "postgresoperator.example.com",
    version = "v1alpha1",
    kind = "PostgresCluster",
    plural = "postgresclusters",
    shortname = "pgc",
    status = "PostgresClusterStatus",
    namespaced,
    // Print columns for kubectl get
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Ready", "type":"integer", "jsonPath":".status.readyReplicas"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PostgresClusterSpec {
    /// Container image reference for PostgreSQL (e.g. "postgres:16").
    /// Required. Changing it drives a rolling update of the workload.
    pub version: String,

    /// Number of replicas. Non-negative. Absent means 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Storage configuration for the data volume.
    pub storage: StorageSpec,
}

impl PostgresClusterSpec {
    /// Effective replica count, applying the platform default of 1.
    pub fn effective_replicas(&self) -> i32 {
        self.replicas.unwrap_or(1)
    }
}

/// Storage configuration for the PostgreSQL data volume.
///
/// Storage class and size are create-once: the platform rejects in-place
/// mutation of a bound claim, and the operator reports a mismatch as a
/// condition instead of attempting it.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Storage class name (uses the cluster default if not specified).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    /// Size of the persistent volume (e.g. "10Gi").
    pub size: String,
}

/// Status of a PostgresCluster.
///
/// Every field mirrors what was read from the live children during the
/// most recent reconcile.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostgresClusterStatus {
    /// Current phase of the cluster lifecycle.
    #[serde(default)]
    pub phase: ClusterPhase,

    /// Number of ready workload replicas.
    #[serde(default)]
    pub ready_replicas: i32,

    /// Number of current workload replicas.
    #[serde(default)]
    pub current_replicas: i32,

    /// Replica count the live workload object is converging to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_replicas: Option<i32>,

    /// Phase of the persistent volume claim (Pending, Bound, Lost).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_phase: Option<String>,

    /// Client endpoint of the live service (host:port).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// The generation most recently observed by the controller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Conditions describing the current state.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Consecutive failed reconcile count, drives requeue backoff.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<i32>,

    /// Last reconcile error message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// ClusterPhase represents the current lifecycle phase of a PostgresCluster.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ClusterPhase {
    /// Initial state, waiting for reconciliation.
    #[default]
    Pending,
    /// Kubernetes resources are being created or are converging.
    Creating,
    /// Cluster is fully operational.
    Running,
    /// Cluster is operational but some replicas are unavailable.
    Degraded,
    /// Cluster has failed and requires intervention.
    Failed,
}

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterPhase::Pending => write!(f, "Pending"),
            ClusterPhase::Creating => write!(f, "Creating"),
            ClusterPhase::Running => write!(f, "Running"),
            ClusterPhase::Degraded => write!(f, "Degraded"),
            ClusterPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Condition describes the state of a cluster at a certain point.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition.
    pub r#type: String,
    /// Status of the condition ("True", "False", "Unknown").
    pub status: String,
    /// Machine-readable reason for the condition's last transition.
    pub reason: String,
    /// Human-readable message indicating details about last transition.
    pub message: String,
    /// Last time the condition transitioned from one status to another.
    pub last_transition_time: String,
    /// The generation of the resource this condition was observed for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Create a new condition.
    pub fn new(
        condition_type: &str,
        status: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> Self {
        Self {
            r#type: condition_type.to_string(),
            status: if status {
                "True".to_string()
            } else {
                "False".to_string()
            },
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: jiff::Timestamp::now().to_string(),
            observed_generation: generation,
        }
    }

    /// Create a "Ready" condition.
    pub fn ready(ready: bool, reason: &str, message: &str, generation: Option<i64>) -> Self {
        Self::new("Ready", ready, reason, message, generation)
    }

    /// Create a "Progressing" condition.
    pub fn progressing(
        progressing: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> Self {
        Self::new("Progressing", progressing, reason, message, generation)
    }

    /// Create a "Degraded" condition.
    pub fn degraded(degraded: bool, reason: &str, message: &str, generation: Option<i64>) -> Self {
        Self::new("Degraded", degraded, reason, message, generation)
    }

    /// Create a "SpecValid" condition.
    pub fn spec_valid(valid: bool, reason: &str, message: &str, generation: Option<i64>) -> Self {
        Self::new("SpecValid", valid, reason, message, generation)
    }

    /// Create a "StorageConsistent" condition.
    pub fn storage_consistent(
        consistent: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> Self {
        Self::new("StorageConsistent", consistent, reason, message, generation)
    }
}
