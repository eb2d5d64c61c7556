//! AttachmentRecord CRD
//!
//! One record per pod (same namespace and name), written by the ENI control
//! loop once interfaces are attached. The webhook only reads it, to keep a
//! recreated stable-identity pod in the zone its interfaces live in.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::network_profile::AllocationType;

/// Record of the network interfaces allocated to a pod
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "network.podnet.io",
    version = "v1beta1",
    kind = "AttachmentRecord",
    namespaced,
    status = "AttachmentRecordStatus",
    printcolumn = r#"{"name":"Zone","type":"string","jsonPath":".spec.zone"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRecordSpec {
    /// Availability zone the interfaces were allocated in
    #[serde(default)]
    pub zone: String,

    /// One entry per attached interface, in attach order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allocations: Vec<Allocation>,
}

/// A single attached interface
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    /// The ENI backing this interface
    #[serde(default)]
    pub eni: NetworkInterface,

    /// IPv4 address
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ipv4: String,

    /// IPv6 address
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ipv6: String,

    /// IPv4 CIDR of the vSwitch
    #[serde(default, rename = "ipv4CIDR", skip_serializing_if = "String::is_empty")]
    pub ipv4_cidr: String,

    /// IPv6 CIDR of the vSwitch
    #[serde(default, rename = "ipv6CIDR", skip_serializing_if = "String::is_empty")]
    pub ipv6_cidr: String,

    /// Interface name inside the pod (e.g., eth0)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interface: String,

    /// Whether this interface carries the default route
    #[serde(default)]
    pub default_route: bool,

    /// Additional routes via this interface
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_routes: Vec<Route>,

    /// Opaque per-interface settings for the CNI
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_config: BTreeMap<String, String>,

    /// IP allocation policy this interface was created under
    #[serde(default)]
    pub allocation_type: AllocationType,
}

/// How an allocated interface is attached to its node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationAttachType {
    /// A dedicated ENI
    Standalone,
    /// A member of the node's trunk ENI
    TrunkMember,
}

impl Allocation {
    /// Attachment kind of this interface
    pub fn attach_type(&self) -> AllocationAttachType {
        if self.eni.attachment_options.trunk.unwrap_or(false) {
            AllocationAttachType::TrunkMember
        } else {
            AllocationAttachType::Standalone
        }
    }
}

/// ENI descriptor
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    /// ENI ID
    #[serde(default)]
    pub id: String,

    /// MAC address
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mac: String,

    /// Zone of the ENI
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub zone: String,

    /// vSwitch the ENI was created in
    #[serde(default, rename = "vSwitchID", skip_serializing_if = "String::is_empty")]
    pub vswitch_id: String,

    /// Security groups on the ENI
    #[serde(default, rename = "securityGroupIDs", skip_serializing_if = "Vec::is_empty")]
    pub security_group_ids: Vec<String>,

    /// Attachment options
    #[serde(default)]
    pub attachment_options: AttachmentOptions,
}

/// ENI attachment options
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentOptions {
    /// Set when the ENI is a trunk member
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trunk: Option<bool>,
}

/// A route through an interface
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Destination CIDR
    pub dst: String,
}

/// Status of an AttachmentRecord
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRecordStatus {
    /// Lifecycle phase (e.g., Bind, Detaching, Deleting)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phase: String,

    /// Instance the interfaces are attached to
    #[serde(default, rename = "instanceID", skip_serializing_if = "String::is_empty")]
    pub instance_id: String,

    /// Trunk ENI of the instance, for trunk members
    #[serde(default, rename = "trunkENIID", skip_serializing_if = "String::is_empty")]
    pub trunk_eni_id: String,

    /// Last error message
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub msg: String,

    /// Last time the owning pod was observed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_last_seen: Option<Time>,

    /// Per-ENI attach state keyed by ENI ID
    #[serde(default, rename = "eniInfos", skip_serializing_if = "BTreeMap::is_empty")]
    pub eni_infos: BTreeMap<String, EniInfo>,
}

/// Attach state of a single ENI
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EniInfo {
    /// ENI ID
    #[serde(default)]
    pub id: String,
    /// ENI type (Secondary, Trunk, Member)
    #[serde(default, rename = "type")]
    pub type_: String,
    /// VLAN ID for trunk members
    #[serde(default)]
    pub vid: u32,
    /// Bind, Unbind, ...
    #[serde(default)]
    pub status: String,
}

impl AttachmentRecord {
    /// Whether the record reflects interfaces that still exist
    ///
    /// A record being deleted, or one with no allocations, says nothing about
    /// where the pod's interfaces are.
    pub fn is_live(&self) -> bool {
        self.metadata.deletion_timestamp.is_none() && !self.spec.allocations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::chrono::Utc;

    fn record(allocations: Vec<Allocation>) -> AttachmentRecord {
        AttachmentRecord::new(
            "web-0",
            AttachmentRecordSpec {
                zone: "z1".to_string(),
                allocations,
            },
        )
    }

    #[test]
    fn empty_record_is_not_live() {
        assert!(!record(vec![]).is_live());
    }

    #[test]
    fn record_being_deleted_is_not_live() {
        let mut rec = record(vec![Allocation::default()]);
        rec.metadata.deletion_timestamp = Some(Time(Utc::now()));
        assert!(!rec.is_live());
    }

    #[test]
    fn record_with_allocation_is_live() {
        assert!(record(vec![Allocation::default()]).is_live());
    }

    #[test]
    fn attach_type_follows_trunk_option() {
        let mut alloc = Allocation::default();
        assert_eq!(alloc.attach_type(), AllocationAttachType::Standalone);
        alloc.eni.attachment_options.trunk = Some(true);
        assert_eq!(alloc.attach_type(), AllocationAttachType::TrunkMember);
    }

    #[test]
    fn spec_wire_names() {
        let json = serde_json::json!({
            "zone": "z1",
            "allocations": [{
                "eni": {"id": "eni-1", "vSwitchID": "vsw-1", "attachmentOptions": {"trunk": true}},
                "ipv4": "10.0.0.2",
                "ipv4CIDR": "10.0.0.0/24",
                "interface": "eth0",
                "defaultRoute": true
            }]
        });
        let spec: AttachmentRecordSpec = serde_json::from_value(json).unwrap();
        let alloc = &spec.allocations[0];
        assert_eq!(alloc.eni.vswitch_id, "vsw-1");
        assert_eq!(alloc.ipv4_cidr, "10.0.0.0/24");
        assert!(alloc.default_route);
        assert_eq!(alloc.attach_type(), AllocationAttachType::TrunkMember);
    }
}
