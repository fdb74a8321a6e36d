//! Resource generation module.
//!
//! Contains pure builders for the Kubernetes resources owned by a
//! PostgresCluster. Given identical desired state they produce identical
//! definitions; all mutation goes through the upsert engine.
//!
//! | Resource | Purpose |
//! |----------|---------|
//! | ConfigMap | Non-secret environment for the workload |
//! | PersistentVolumeClaim | Data volume for the database |
//! | Service | Stable client endpoint on the data port |
//! | StatefulSet | The replicated PostgreSQL workload |

pub mod common;
pub mod configmap;
pub mod pvc;
pub mod service;
pub mod statefulset;

// Re-export commonly used items from common
pub use common::{owner_reference, standard_labels};
