//! ENI resource requests
//!
//! The device plugin advertises ENIs as extended resources. Requesting them
//! on the pod lets the scheduler only place it on nodes that still have
//! ENI capacity of the right kind.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Pod, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::network::NetworkRequest;

/// Extended resource for a dedicated ENI
pub const STANDALONE_ENI_RESOURCE: &str = "network.podnet.io/eni";

/// Extended resource for an ENI attached as a trunk member
pub const TRUNK_MEMBER_ENI_RESOURCE: &str = "network.podnet.io/member-eni";

/// Resource kind for a set of requests
///
/// Any explicit standalone request forces standalone ENIs for the whole pod,
/// as does a cluster without trunking.
pub fn eni_resource_kind(requests: &[NetworkRequest], trunk_enabled: bool) -> &'static str {
    if !trunk_enabled || requests.iter().any(NetworkRequest::is_standalone) {
        STANDALONE_ENI_RESOURCE
    } else {
        TRUNK_MEMBER_ENI_RESOURCE
    }
}

/// Request one ENI per network on the pod's first container
///
/// Both limits and requests are set; other resources on the container are
/// kept. A pod with no requests or no containers is left unchanged.
pub fn inject_resource_request(pod: &mut Pod, requests: &[NetworkRequest], trunk_enabled: bool) {
    if requests.is_empty() {
        return;
    }
    let Some(container) = pod.spec.as_mut().and_then(|s| s.containers.first_mut()) else {
        return;
    };

    let kind = eni_resource_kind(requests, trunk_enabled);
    let quantity = Quantity(requests.len().to_string());

    let resources = container
        .resources
        .get_or_insert_with(ResourceRequirements::default);
    resources
        .limits
        .get_or_insert_with(BTreeMap::new)
        .insert(kind.to_string(), quantity.clone());
    resources
        .requests
        .get_or_insert_with(BTreeMap::new)
        .insert(kind.to_string(), quantity);
}
