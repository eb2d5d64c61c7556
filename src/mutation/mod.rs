//! Pod mutation at admission time
//!
//! [`PodMutator`] runs one admission pass over a pod:
//! 1. Skip pods that never get ENIs (no containers, host network, opted out)
//! 2. Resolve the zone of the pod's previous attachment, if it is sticky
//! 3. Pick networks, from the request annotation or by profile selectors
//! 4. Constrain node affinity to the networks' zones and the previous zone
//! 5. Request ENI resources on the first container
//! 6. Record the decision in annotations
//!
//! A pod with no matching profile is admitted unchanged.

pub mod affinity;
pub mod deadline;
pub mod profile;
pub mod resources;
pub mod zone;

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, info, instrument};

use crate::network::{
    self, NetworkRequest, PodNetworksAnnotation, DEFAULT_INTERFACE, POD_NETWORKS_ANNOTATION,
    PROFILE_ANNOTATION,
};
use crate::owner::OwnerKindRegistry;
use crate::store::ProfileStore;
use crate::Result;

pub use affinity::{apply_zone_affinity, ZONE_LABEL};
pub use deadline::ReadDeadline;
pub use profile::{find_applicable_profile, resolve_requested_networks, RequestedNetworks};
pub use resources::{
    eni_resource_kind, inject_resource_request, STANDALONE_ENI_RESOURCE, TRUNK_MEMBER_ENI_RESOURCE,
};
pub use zone::resolve_previous_zone;

/// Label that opts a pod out of ENI networking
pub const IGNORE_LABEL: &str = "network.podnet.io/ignore";

/// Why a pod was admitted without looking at profiles
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The pod has no containers to request resources on
    NoContainers,
    /// The pod shares the node's network namespace
    HostNetwork,
    /// The pod carries [`IGNORE_LABEL`]
    OptedOut,
}

/// Result of one admission pass
#[derive(Clone, Debug, PartialEq)]
pub enum MutationOutcome {
    /// Admitted unchanged before any read
    Skipped(SkipReason),
    /// No Ready profile matched; admitted unchanged
    NoProfile,
    /// Affinity, resources and annotations were applied
    Mutated {
        /// Profile matched by selectors, `None` for explicit requests
        profile: Option<String>,
        /// Number of networks requested
        networks: usize,
        /// Zone of the previous attachment, `""` if none
        previous_zone: String,
    },
}

impl MutationOutcome {
    /// Short label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationOutcome::Skipped(_) => "skipped",
            MutationOutcome::NoProfile => "no_profile",
            MutationOutcome::Mutated { .. } => "mutated",
        }
    }
}

fn skip_reason(pod: &Pod) -> Option<SkipReason> {
    let ignored = pod
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(IGNORE_LABEL))
        .is_some_and(|v| v == "true");
    if ignored {
        return Some(SkipReason::OptedOut);
    }
    match &pod.spec {
        None => Some(SkipReason::NoContainers),
        Some(spec) if spec.containers.is_empty() => Some(SkipReason::NoContainers),
        Some(spec) if spec.host_network == Some(true) => Some(SkipReason::HostNetwork),
        Some(_) => None,
    }
}

fn set_annotation(pod: &mut Pod, key: &str, value: String) {
    pod.metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(key.to_string(), value);
}

/// Sequences zone resolution, profile matching, affinity and resources
#[derive(Clone)]
pub struct PodMutator {
    store: Arc<dyn ProfileStore>,
    owners: Arc<OwnerKindRegistry>,
    trunk_enabled: bool,
}

impl PodMutator {
    /// Create a mutator reading from `store`
    pub fn new(
        store: Arc<dyn ProfileStore>,
        owners: Arc<OwnerKindRegistry>,
        trunk_enabled: bool,
    ) -> Self {
        Self {
            store,
            owners,
            trunk_enabled,
        }
    }

    /// Mutate `pod` in place for admission into `namespace`
    ///
    /// On error the pod is left untouched: every read happens before the
    /// first write.
    #[instrument(
        skip(self, pod, deadline),
        fields(pod = %pod.metadata.name.as_deref().unwrap_or_default())
    )]
    pub async fn mutate(
        &self,
        pod: &mut Pod,
        namespace: &str,
        deadline: &ReadDeadline,
    ) -> Result<MutationOutcome> {
        if let Some(reason) = skip_reason(pod) {
            debug!(?reason, "skipping pod");
            return Ok(MutationOutcome::Skipped(reason));
        }

        let attachments = network::attachment_requests(pod)?;

        let previous_zone = resolve_previous_zone(
            self.store.as_ref(),
            &self.owners,
            deadline,
            namespace,
            pod,
        )
        .await?;

        let (profile, zones, requests): (Option<String>, Vec<String>, Vec<NetworkRequest>) =
            if attachments.is_empty() {
                let Some(matched) =
                    find_applicable_profile(self.store.as_ref(), deadline, namespace, pod).await?
                else {
                    debug!("no network profile matched");
                    return Ok(MutationOutcome::NoProfile);
                };
                let request = NetworkRequest::from_profile(&matched, DEFAULT_INTERFACE);
                (matched.metadata.name.clone(), matched.zones(), vec![request])
            } else {
                let resolved =
                    resolve_requested_networks(self.store.as_ref(), deadline, &attachments).await?;
                (None, resolved.zones, resolved.requests)
            };

        let previous_zones: Vec<String> = if previous_zone.is_empty() {
            Vec::new()
        } else {
            vec![previous_zone.clone()]
        };

        let annotation = serde_json::to_string(&PodNetworksAnnotation {
            pod_networks: requests.clone(),
        })?;

        apply_zone_affinity(pod, &zones, &previous_zones, &self.owners);
        inject_resource_request(pod, &requests, self.trunk_enabled);
        if let Some(name) = &profile {
            set_annotation(pod, PROFILE_ANNOTATION, name.clone());
        }
        set_annotation(pod, POD_NETWORKS_ANNOTATION, annotation);

        info!(
            profile = profile.as_deref().unwrap_or_default(),
            networks = requests.len(),
            zones = ?zones,
            previous_zone = %previous_zone,
            resource = eni_resource_kind(&requests, self.trunk_enabled),
            "mutated pod networking"
        );

        Ok(MutationOutcome::Mutated {
            profile,
            networks: requests.len(),
            previous_zone,
        })
    }
}
