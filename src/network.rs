//! Network requests and the pod annotations that carry them
//!
//! A [`NetworkRequest`] is what the webhook decides a pod needs: one entry
//! per interface. It is written back to the pod as the
//! [`POD_NETWORKS_ANNOTATION`] so the CNI and ENI control loop agree on it.

use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};

use crate::crd::{
    AllocationType, AttachType, EniOptions, NetworkProfile, Route, VSwitchSelectOptions,
};
use crate::{Error, Result};

/// Annotation a pod may set to request specific profiles per interface
pub const POD_NETWORKS_REQUEST_ANNOTATION: &str = "network.podnet.io/pod-networks-request";

/// Annotation written with the resolved network requests
pub const POD_NETWORKS_ANNOTATION: &str = "network.podnet.io/pod-networks";

/// Annotation written with the selector-matched profile name
pub const PROFILE_ANNOTATION: &str = "network.podnet.io/profile";

/// Interface name used when a profile is matched by selectors
pub const DEFAULT_INTERFACE: &str = "eth0";

/// One entry of [`POD_NETWORKS_REQUEST_ANNOTATION`]
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRequest {
    /// Interface name inside the pod; defaults to eth0, eth1, ... by position
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interface_name: String,

    /// NetworkProfile name
    pub network: String,

    /// Whether this interface carries the default route
    #[serde(default)]
    pub default_route: bool,

    /// Extra routes through this interface
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
}

/// A single network a pod needs attached
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequest {
    /// Interface name inside the pod
    pub interface: String,

    /// Profile this request came from
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network: String,

    /// Candidate vSwitches
    #[serde(default, rename = "vSwitchOptions", skip_serializing_if = "Vec::is_empty")]
    pub vswitch_options: Vec<String>,

    /// Security groups
    #[serde(default, rename = "securityGroupIDs", skip_serializing_if = "Vec::is_empty")]
    pub security_group_ids: Vec<String>,

    /// ENI attachment options
    #[serde(default)]
    pub eni_options: EniOptions,

    /// vSwitch selection policy
    #[serde(default, rename = "vSwitchSelectOptions")]
    pub vswitch_select_options: VSwitchSelectOptions,

    /// IP allocation policy
    #[serde(default)]
    pub allocation_type: AllocationType,

    /// Whether this interface carries the default route
    #[serde(default)]
    pub default_route: bool,

    /// Extra routes through this interface
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_routes: Vec<Route>,
}

impl NetworkRequest {
    /// Build the request a profile implies for one interface
    pub fn from_profile(profile: &NetworkProfile, interface: impl Into<String>) -> Self {
        let spec = &profile.spec;
        Self {
            interface: interface.into(),
            network: profile.metadata.name.clone().unwrap_or_default(),
            vswitch_options: spec.vswitch_options.clone(),
            security_group_ids: spec.security_group_ids.clone(),
            eni_options: spec.eni_options.clone(),
            vswitch_select_options: spec.vswitch_select_options.clone(),
            allocation_type: spec.allocation_type.clone(),
            default_route: false,
            extra_routes: Vec::new(),
        }
    }

    /// Build the request for an explicit per-interface entry
    pub fn from_attachment(profile: &NetworkProfile, req: &AttachmentRequest) -> Self {
        Self {
            default_route: req.default_route,
            extra_routes: req.routes.clone(),
            ..Self::from_profile(profile, req.interface_name.clone())
        }
    }

    /// Whether this request explicitly asks for a dedicated ENI
    pub fn is_standalone(&self) -> bool {
        self.eni_options.attach_type == AttachType::Standalone
    }
}

/// Payload of [`POD_NETWORKS_ANNOTATION`]
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PodNetworksAnnotation {
    /// Requests in interface order
    pub pod_networks: Vec<NetworkRequest>,
}

/// Parse [`POD_NETWORKS_REQUEST_ANNOTATION`] from a pod
///
/// Returns an empty list when the annotation is absent or blank. Entries
/// without an interface name get `eth<index>`.
pub fn attachment_requests(pod: &Pod) -> Result<Vec<AttachmentRequest>> {
    let Some(raw) = pod
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(POD_NETWORKS_REQUEST_ANNOTATION))
        .filter(|raw| !raw.trim().is_empty())
    else {
        return Ok(Vec::new());
    };

    let mut requests: Vec<AttachmentRequest> = serde_json::from_str(raw).map_err(|e| {
        Error::validation(format!(
            "malformed {} annotation: {}",
            POD_NETWORKS_REQUEST_ANNOTATION, e
        ))
    })?;

    for (i, req) in requests.iter_mut().enumerate() {
        if req.network.is_empty() {
            return Err(Error::validation(format!(
                "{} entry {} does not name a network",
                POD_NETWORKS_REQUEST_ANNOTATION, i
            )));
        }
        if req.interface_name.is_empty() {
            req.interface_name = format!("eth{i}");
        }
    }
    Ok(requests)
}
