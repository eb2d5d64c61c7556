//! NetworkProfile CRD
//!
//! A NetworkProfile describes which pods get which vSwitches, security groups
//! and ENI attachment options. The profile controller resolves the
//! configured vSwitches into `status.vSwitches`, which is where the eligible
//! zones come from.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, Time};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// NetworkProfile selects pods and assigns them network attachment options.
///
/// Example:
/// ```yaml
/// apiVersion: network.podnet.io/v1beta1
/// kind: NetworkProfile
/// metadata:
///   name: payments
/// spec:
///   selector:
///     podSelector:
///       matchLabels:
///         app: payments
///   vSwitchOptions: [vsw-a, vsw-b]
///   securityGroupIDs: [sg-1]
///   eniOptions:
///     eniAttachType: Trunk
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "network.podnet.io",
    version = "v1beta1",
    kind = "NetworkProfile",
    status = "NetworkProfileStatus",
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfileSpec {
    /// Which pods this profile applies to
    #[serde(default)]
    pub selector: ProfileSelector,

    /// How ENIs are attached for matched pods
    #[serde(default)]
    pub eni_options: EniOptions,

    /// Whether IPs follow the pod across recreation
    #[serde(default)]
    pub allocation_type: AllocationType,

    /// Security groups applied to the ENI
    #[serde(default, rename = "securityGroupIDs", skip_serializing_if = "Vec::is_empty")]
    pub security_group_ids: Vec<String>,

    /// Candidate vSwitches, resolved to zones by the profile controller
    #[serde(default, rename = "vSwitchOptions", skip_serializing_if = "Vec::is_empty")]
    pub vswitch_options: Vec<String>,

    /// How a vSwitch is picked among the candidates
    #[serde(default, rename = "vSwitchSelectOptions")]
    pub vswitch_select_options: VSwitchSelectOptions,
}

/// Pod and namespace selectors. Both must match when both are set.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSelector {
    /// Selector over the pod's labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_selector: Option<LabelSelector>,

    /// Selector over the pod's namespace labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<LabelSelector>,
}

/// ENI attachment options
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EniOptions {
    /// Requested attachment type
    #[serde(default, rename = "eniAttachType")]
    pub attach_type: AttachType,
}

/// ENI attachment type requested by a profile
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum AttachType {
    /// Trunk member when the cluster supports trunking, standalone otherwise
    #[default]
    Default,
    /// Dedicated (standalone) ENI
    #[serde(rename = "ENI")]
    Standalone,
    /// Trunk member ENI
    Trunk,
}

/// IP allocation policy
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AllocationType {
    /// Elastic or Fixed
    #[serde(default, rename = "type")]
    pub type_: IpAllocationKind,

    /// When a fixed IP is released
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_strategy: Option<ReleaseStrategy>,

    /// Grace period for the TTL release strategy (Go duration string)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_after: Option<String>,
}

/// IP allocation kind
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum IpAllocationKind {
    /// IP released with the pod
    #[default]
    Elastic,
    /// IP retained across pod recreation
    Fixed,
}

/// Release strategy for fixed IPs
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ReleaseStrategy {
    /// Released after `releaseAfter`
    TTL,
    /// Never released automatically
    Never,
}

/// vSwitch selection options
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VSwitchSelectOptions {
    /// Selection policy
    #[serde(default, rename = "vSwitchSelectionPolicy")]
    pub selection_policy: VSwitchSelectionPolicy,
}

/// vSwitch selection policy
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VSwitchSelectionPolicy {
    /// In declaration order
    #[default]
    Ordered,
    /// Random pick
    Random,
    /// The vSwitch with the most free IPs
    Most,
}

/// Readiness of a NetworkProfile, as reported by the profile controller
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ReadinessStatus {
    /// vSwitches resolved, usable for matching
    Ready,
    /// Reconciliation failed
    #[serde(rename = "Fail")]
    Failed,
    /// Not yet reconciled, or a status this webhook does not know
    #[default]
    #[serde(other)]
    Pending,
}

/// A resolved vSwitch and its zone
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VSwitch {
    /// vSwitch ID
    pub id: String,
    /// Availability zone of the vSwitch
    pub zone: String,
}

/// Status of a NetworkProfile
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfileStatus {
    /// Readiness
    #[serde(default)]
    pub status: ReadinessStatus,

    /// Resolved vSwitches
    #[serde(default, rename = "vSwitches", skip_serializing_if = "Vec::is_empty")]
    pub vswitches: Vec<VSwitch>,

    /// Last status update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_at: Option<Time>,

    /// Human-readable reason for the current status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl NetworkProfile {
    /// Whether the profile may be used for matching
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.status == ReadinessStatus::Ready)
    }

    /// Eligible zones, deduplicated in first-seen order
    pub fn zones(&self) -> Vec<String> {
        let mut zones: Vec<String> = Vec::new();
        for vsw in self.status.iter().flat_map(|s| s.vswitches.iter()) {
            if !vsw.zone.is_empty() && !zones.contains(&vsw.zone) {
                zones.push(vsw.zone.clone());
            }
        }
        zones
    }
}
