//! Zone constraints on required node affinity
//!
//! Node-selector terms are OR'd by the scheduler and the expressions inside a
//! term are AND'd, so a zone constraint has to be appended to every term to
//! hold regardless of which term ends up matching.

use k8s_openapi::api::core::v1::{
    Affinity, NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm, Pod,
};

use crate::owner::{OwnerClass, OwnerKindRegistry};

/// Well-known node label carrying the availability zone
pub const ZONE_LABEL: &str = "topology.kubernetes.io/zone";

fn zone_in(zones: &[String]) -> NodeSelectorRequirement {
    NodeSelectorRequirement {
        key: ZONE_LABEL.to_string(),
        operator: "In".to_string(),
        values: Some(zones.to_vec()),
    }
}

fn append_zone_expressions(term: &mut NodeSelectorTerm, zones: &[String], previous: &[String]) {
    let exprs = term.match_expressions.get_or_insert_with(Vec::new);
    if !zones.is_empty() {
        exprs.push(zone_in(zones));
    }
    if !previous.is_empty() {
        exprs.push(zone_in(previous));
    }
}

fn has_required_terms(pod: &Pod) -> bool {
    pod.spec
        .as_ref()
        .and_then(|s| s.affinity.as_ref())
        .and_then(|a| a.node_affinity.as_ref())
        .and_then(|n| n.required_during_scheduling_ignored_during_execution.as_ref())
        .is_some_and(|r| !r.node_selector_terms.is_empty())
}

/// Require the pod to land in one of `zones` and one of `previous_zones`
///
/// Pods of node-local owners are left alone. Without existing required
/// terms a single term requiring `zones` is created, and only when `zones`
/// is non-empty; `previous_zones` is not applied to a created term.
/// Otherwise every existing term gets the zone expressions appended after
/// its own, `zones` first; match fields are never touched.
///
/// This appends unconditionally: calling it twice with the same inputs
/// duplicates the expressions. Call it once per admission.
pub fn apply_zone_affinity(
    pod: &mut Pod,
    zones: &[String],
    previous_zones: &[String],
    owners: &OwnerKindRegistry,
) {
    if owners.classify(pod) == OwnerClass::NodeLocal {
        return;
    }

    let existing = has_required_terms(pod);
    if !existing && zones.is_empty() {
        return;
    }
    if existing && zones.is_empty() && previous_zones.is_empty() {
        return;
    }

    let required = pod
        .spec
        .get_or_insert_with(Default::default)
        .affinity
        .get_or_insert_with(Affinity::default)
        .node_affinity
        .get_or_insert_with(NodeAffinity::default)
        .required_during_scheduling_ignored_during_execution
        .get_or_insert_with(NodeSelector::default);

    if !existing {
        required.node_selector_terms = vec![NodeSelectorTerm {
            match_expressions: Some(vec![zone_in(zones)]),
            match_fields: None,
        }];
        return;
    }

    for term in &mut required.node_selector_terms {
        append_zone_expressions(term, zones, previous_zones);
    }
}
