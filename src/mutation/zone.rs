//! Previous-zone lookup for stable-identity pods
//!
//! A pod that is recreated under the same name (StatefulSet-style) may still
//! own ENIs in the zone it ran in before. Pinning it back to that zone avoids
//! a cross-zone detach/attach cycle.

use k8s_openapi::api::core::v1::Pod;
use tracing::debug;

use super::deadline::ReadDeadline;
use crate::crd::AllocationAttachType;
use crate::owner::{OwnerClass, OwnerKindRegistry};
use crate::store::ProfileStore;
use crate::Result;

/// Zone of the pod's previous network attachment, or `""` if there is none
///
/// Only stable-identity pods are looked up; any other pod returns `""`
/// without touching the store. An absent record, one being deleted, or one
/// with no allocations also yields `""`. Read errors propagate.
pub async fn resolve_previous_zone(
    store: &dyn ProfileStore,
    owners: &OwnerKindRegistry,
    deadline: &ReadDeadline,
    namespace: &str,
    pod: &Pod,
) -> Result<String> {
    if owners.classify(pod) != OwnerClass::StableIdentity {
        return Ok(String::new());
    }

    let name = pod.metadata.name.as_deref().unwrap_or_default();
    if name.is_empty() {
        // generateName pods have no identity to be sticky about yet
        return Ok(String::new());
    }

    let record = deadline
        .run(
            "get_attachment_record",
            store.get_attachment_record(namespace, name),
        )
        .await?;

    match record {
        Some(record) if record.is_live() => {
            let trunk_members = record
                .spec
                .allocations
                .iter()
                .filter(|a| a.attach_type() == AllocationAttachType::TrunkMember)
                .count();
            debug!(
                namespace = %namespace,
                pod = %name,
                zone = %record.spec.zone,
                allocations = record.spec.allocations.len(),
                trunk_members,
                "found previous attachment zone"
            );
            Ok(record.spec.zone)
        }
        Some(_) => {
            debug!(namespace = %namespace, pod = %name, "attachment record not live, ignoring");
            Ok(String::new())
        }
        None => Ok(String::new()),
    }
}
