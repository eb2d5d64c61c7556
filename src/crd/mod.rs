//! Custom Resource Definitions read by the webhook
//!
//! Both resources are owned by the ENI control loop; the webhook never writes
//! them. All types derive `Clone`, which is the only deep copy they need.

mod attachment_record;
mod network_profile;

pub use attachment_record::{
    Allocation, AllocationAttachType, AttachmentOptions, AttachmentRecord, AttachmentRecordSpec,
    AttachmentRecordStatus, EniInfo, NetworkInterface, Route,
};
pub use network_profile::{
    AllocationType, AttachType, EniOptions, IpAllocationKind, NetworkProfile,
    NetworkProfileSpec, NetworkProfileStatus, ProfileSelector, ReadinessStatus, ReleaseStrategy,
    VSwitch, VSwitchSelectOptions, VSwitchSelectionPolicy,
};
