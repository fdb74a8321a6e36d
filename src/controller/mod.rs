//! Controller module for postgres-operator.
//!
//! Contains the reconciliation pipeline, the upsert engine, error handling,
//! status aggregation, and spec validation.

pub mod context;
pub mod error;
pub mod reconciler;
pub mod status;
pub mod upsert;
pub mod validation;

pub use context::Context;
pub use error::{BackoffConfig, Error, Result};
pub use reconciler::{FIELD_MANAGER, error_policy, reconcile};
pub use status::{ConditionBuilder, ObservedChildren};
pub use upsert::{ManagedObject, Outcome, ResourceKind};
pub use validation::validate_spec;
