//! Generic get-or-create-or-update primitive for managed child resources.
//!
//! Each managed kind implements [`ManagedObject`], which declares its tag in
//! the closed [`ResourceKind`] set and how to project the mutable subset of
//! a desired definition onto a live object. [`ensure`] drives the
//! create-or-update path with optimistic concurrency: updates carry the live
//! object's resourceVersion, and a conflicting concurrent write is detected
//! and retried a bounded number of times within the same invocation.

use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};
use kube::api::PostParams;
use kube::{Api, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use tracing::{debug, info};

use crate::controller::error::Error;

/// Bounded in-invocation retries on resourceVersion conflicts
const CONFLICT_RETRIES: u32 = 3;

/// Result of an ensure call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The resource did not exist and was created.
    Created,
    /// The live resource differed in a mutable field and was updated.
    Updated,
    /// The live resource already matched the desired definition.
    Unchanged,
}

/// The closed set of managed resource kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Configuration,
    Storage,
    Network,
    Workload,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Configuration => write!(f, "Configuration"),
            ResourceKind::Storage => write!(f, "Storage"),
            ResourceKind::Network => write!(f, "Network"),
            ResourceKind::Workload => write!(f, "Workload"),
        }
    }
}

/// Capability implemented by each managed child kind.
///
/// `project` copies the caller-designated mutable fields of `desired` onto
/// `live` and reports whether anything changed. Implementations must never
/// touch platform-managed fields: status, generated identifiers,
/// resourceVersion, finalizers, or create-once spec fields.
pub trait ManagedObject:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + DeserializeOwned
    + Serialize
    + fmt::Debug
    + Send
    + Sync
{
    /// Which of the closed set of kinds this object is.
    const KIND: ResourceKind;

    /// Project the mutable subset of `desired` onto `live`.
    fn project(desired: &Self, live: &mut Self) -> bool;
}

impl ManagedObject for ConfigMap {
    const KIND: ResourceKind = ResourceKind::Configuration;

    fn project(desired: &Self, live: &mut Self) -> bool {
        let mut changed = false;
        if live.data != desired.data {
            live.data = desired.data.clone();
            changed = true;
        }
        changed | project_labels(desired, live)
    }
}

impl ManagedObject for PersistentVolumeClaim {
    const KIND: ResourceKind = ResourceKind::Storage;

    // The claim spec is create-once; only labels are reconcilable.
    fn project(desired: &Self, live: &mut Self) -> bool {
        project_labels(desired, live)
    }
}

impl ManagedObject for Service {
    const KIND: ResourceKind = ResourceKind::Network;

    // Mutates selector, ports, and type in place; clusterIP and other
    // platform-assigned spec fields are preserved from the live object.
    fn project(desired: &Self, live: &mut Self) -> bool {
        let mut changed = false;
        let desired_spec = desired.spec.clone().unwrap_or_default();
        let live_spec = live.spec.get_or_insert_with(Default::default);
        if live_spec.selector != desired_spec.selector {
            live_spec.selector = desired_spec.selector;
            changed = true;
        }
        if live_spec.ports != desired_spec.ports {
            live_spec.ports = desired_spec.ports;
            changed = true;
        }
        if live_spec.type_ != desired_spec.type_ {
            live_spec.type_ = desired_spec.type_;
            changed = true;
        }
        changed | project_labels(desired, live)
    }
}

impl ManagedObject for StatefulSet {
    const KIND: ResourceKind = ResourceKind::Workload;

    // Replica count and pod image are the mutable fields; selector and
    // volume/mount topology are held stable once set.
    fn project(desired: &Self, live: &mut Self) -> bool {
        let mut changed = false;
        let desired_spec = desired.spec.clone().unwrap_or_default();
        let live_spec = live.spec.get_or_insert_with(Default::default);
        if live_spec.replicas != desired_spec.replicas {
            live_spec.replicas = desired_spec.replicas;
            changed = true;
        }
        let desired_image = desired_spec
            .template
            .spec
            .as_ref()
            .and_then(|s| s.containers.first())
            .and_then(|c| c.image.clone());
        if let Some(live_container) = live_spec
            .template
            .spec
            .as_mut()
            .and_then(|s| s.containers.first_mut())
        {
            if live_container.image != desired_image {
                live_container.image = desired_image;
                changed = true;
            }
        }
        changed | project_labels(desired, live)
    }
}

/// Reconcile object labels from the desired definition.
fn project_labels<K: Resource>(desired: &K, live: &mut K) -> bool {
    if live.meta().labels != desired.meta().labels {
        live.meta_mut().labels = desired.meta().labels.clone();
        return true;
    }
    false
}

/// Refresh the controller owner reference from the desired definition.
///
/// Runs on every call even when nothing else changed, to heal manual edits
/// that stripped the ownership link.
fn refresh_owner<K: ManagedObject>(desired: &K, live: &mut K) -> bool {
    let desired_owners = &desired.meta().owner_references;
    let healthy = desired_owners.as_ref().is_some_and(|owners| {
        owners.iter().all(|owner| {
            live.owner_references()
                .iter()
                .any(|live_owner| live_owner.uid == owner.uid && live_owner.controller == owner.controller)
        })
    });
    if !healthy {
        live.meta_mut().owner_references = desired_owners.clone();
        return true;
    }
    false
}

/// Ensure a managed child matches its desired definition.
///
/// Reads the live resource by its deterministic name; creates it when
/// absent, otherwise applies the restricted diff via an update carrying the
/// live resourceVersion. A 409 re-reads and retries up to
/// [`CONFLICT_RETRIES`] times before surfacing a retryable conflict error.
pub async fn ensure<K: ManagedObject>(api: &Api<K>, desired: &K) -> Result<Outcome, Error> {
    let name = desired
        .meta()
        .name
        .clone()
        .ok_or_else(|| Error::MissingField("metadata.name".to_string()))?;

    for _attempt in 0..=CONFLICT_RETRIES {
        let live = match api.get(&name).await {
            Ok(live) => Some(live),
            Err(kube::Error::Api(e)) if e.code == 404 => None,
            Err(e) => return Err(Error::Kube(e)),
        };

        let Some(live) = live else {
            match api.create(&PostParams::default(), desired).await {
                Ok(_) => {
                    info!(kind = %K::KIND, name = %name, "Created resource");
                    return Ok(Outcome::Created);
                }
                // Lost a create race; re-read and take the update path.
                Err(kube::Error::Api(e)) if e.code == 409 => continue,
                Err(e) => return Err(Error::Kube(e)),
            }
        };

        let mut updated = live.clone();
        let mut changed = K::project(desired, &mut updated);
        changed |= refresh_owner(desired, &mut updated);
        if !changed {
            debug!(kind = %K::KIND, name = %name, "Resource unchanged");
            return Ok(Outcome::Unchanged);
        }

        // `updated` still carries the live resourceVersion, so a concurrent
        // writer surfaces as a 409 instead of being overwritten.
        match api.replace(&name, &PostParams::default(), &updated).await {
            Ok(_) => {
                info!(kind = %K::KIND, name = %name, "Updated resource");
                return Ok(Outcome::Updated);
            }
            Err(kube::Error::Api(e)) if e.code == 409 => continue,
            Err(e) => return Err(Error::Kube(e)),
        }
    }

    Err(Error::Conflict(format!(
        "update of {} conflicted {} times",
        name,
        CONFLICT_RETRIES + 1
    )))
}
