//! Owner-kind taxonomy
//!
//! Whether a pod keeps its identity across recreation, or runs once per node,
//! depends on the kind of controller that owns it. The mapping is
//! configuration: it is built once at startup and shared read-only.

use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

/// Default kinds whose pods reuse their name when recreated
pub const DEFAULT_STABLE_OWNER_KINDS: &[&str] = &["StatefulSet"];

/// Default kinds that run exactly one pod per node
pub const DEFAULT_NODE_LOCAL_OWNER_KINDS: &[&str] = &["DaemonSet"];

/// Identity class of a pod, derived from its controlling owner
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnerClass {
    /// Replacement pods reuse the same namespace/name
    StableIdentity,
    /// One pod per node, placed on every node unconditionally
    NodeLocal,
    /// Replacement pods get fresh names
    ChurningIdentity,
}

/// Classifies controller kinds into [`OwnerClass`]es
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnerKindRegistry {
    stable: BTreeSet<String>,
    node_local: BTreeSet<String>,
}

impl Default for OwnerKindRegistry {
    fn default() -> Self {
        Self::new(
            DEFAULT_STABLE_OWNER_KINDS.iter().copied(),
            DEFAULT_NODE_LOCAL_OWNER_KINDS.iter().copied(),
        )
    }
}

impl OwnerKindRegistry {
    /// Build a registry from explicit kind lists
    ///
    /// A kind listed in both sets is treated as node-local.
    pub fn new<S, N>(stable: S, node_local: N) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
        N: IntoIterator,
        N::Item: Into<String>,
    {
        Self {
            stable: stable.into_iter().map(Into::into).collect(),
            node_local: node_local.into_iter().map(Into::into).collect(),
        }
    }

    /// Classify a controller kind
    pub fn classify_kind(&self, kind: &str) -> OwnerClass {
        if self.node_local.contains(kind) {
            OwnerClass::NodeLocal
        } else if self.stable.contains(kind) {
            OwnerClass::StableIdentity
        } else {
            OwnerClass::ChurningIdentity
        }
    }

    /// Classify a pod by its controlling owner
    ///
    /// A pod without owners keeps whatever name its creator gave it, so it
    /// is stable.
    pub fn classify(&self, pod: &Pod) -> OwnerClass {
        match controlling_owner(pod) {
            Some(owner) => self.classify_kind(&owner.kind),
            None => OwnerClass::StableIdentity,
        }
    }
}

/// The owner reference marked as controller, or the first one
pub fn controlling_owner(pod: &Pod) -> Option<&OwnerReference> {
    let owners = pod.metadata.owner_references.as_deref()?;
    owners
        .iter()
        .find(|o| o.controller == Some(true))
        .or_else(|| owners.first())
}
