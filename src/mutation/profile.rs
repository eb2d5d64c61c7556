//! Profile matching
//!
//! A pod gets its networks one of two ways: the first Ready NetworkProfile
//! whose selectors match it, or the profiles it names explicitly in the
//! pod-networks-request annotation.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use tracing::debug;

use super::deadline::ReadDeadline;
use crate::crd::NetworkProfile;
use crate::network::{AttachmentRequest, NetworkRequest};
use crate::selector;
use crate::store::ProfileStore;
use crate::{Error, Result};

/// Networks resolved from explicitly requested profiles
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestedNetworks {
    /// Zones every requested profile can serve, in the first profile's order
    pub zones: Vec<String>,
    /// One request per annotation entry, in annotation order
    pub requests: Vec<NetworkRequest>,
}

fn profile_name(profile: &NetworkProfile) -> &str {
    profile.metadata.name.as_deref().unwrap_or_default()
}

fn selector_matches(
    profile: &NetworkProfile,
    selector: &LabelSelector,
    labels: &BTreeMap<String, String>,
) -> Result<bool> {
    selector::matches(selector, labels)
        .map_err(|e| Error::invalid_selector(profile_name(profile), e.to_string()))
}

/// Find the first Ready profile whose selectors all match the pod
///
/// Profiles are tried in listing order. Namespace labels are read at most
/// once, and only if some candidate has a namespace selector. A profile
/// with a malformed selector fails the whole lookup, even if a later
/// profile would have matched.
pub async fn find_applicable_profile(
    store: &dyn ProfileStore,
    deadline: &ReadDeadline,
    namespace: &str,
    pod: &Pod,
) -> Result<Option<NetworkProfile>> {
    let profiles = deadline
        .run("list_network_profiles", store.list_network_profiles())
        .await?;

    let empty = BTreeMap::new();
    let pod_labels = pod.metadata.labels.as_ref().unwrap_or(&empty);
    let mut namespace_labels: Option<BTreeMap<String, String>> = None;

    for profile in profiles {
        if !profile.is_ready() {
            continue;
        }

        if let Some(sel) = &profile.spec.selector.pod_selector {
            if !selector_matches(&profile, sel, pod_labels)? {
                continue;
            }
        }

        if let Some(sel) = &profile.spec.selector.namespace_selector {
            if namespace_labels.is_none() {
                namespace_labels = Some(
                    deadline
                        .run("get_namespace_labels", store.get_namespace_labels(namespace))
                        .await?,
                );
            }
            let labels = namespace_labels.as_ref().unwrap_or(&empty);
            if !selector_matches(&profile, sel, labels)? {
                continue;
            }
        }

        debug!(profile = %profile_name(&profile), namespace = %namespace, "matched network profile");
        return Ok(Some(profile));
    }

    Ok(None)
}

/// Resolve explicitly requested profiles into network requests and zones
///
/// Every named profile must exist and be Ready. The usable zones are the
/// ones all profiles share; profiles without zones do not constrain it.
pub async fn resolve_requested_networks(
    store: &dyn ProfileStore,
    deadline: &ReadDeadline,
    attachments: &[AttachmentRequest],
) -> Result<RequestedNetworks> {
    let mut zones: Option<Vec<String>> = None;
    let mut requests = Vec::with_capacity(attachments.len());

    for attachment in attachments {
        let profile = deadline
            .run(
                "get_network_profile",
                store.get_network_profile(&attachment.network),
            )
            .await?
            .ok_or_else(|| {
                Error::validation(format!(
                    "network profile {} not found",
                    attachment.network
                ))
            })?;

        if !profile.is_ready() {
            return Err(Error::validation(format!(
                "network profile {} is not ready",
                attachment.network
            )));
        }

        let profile_zones = profile.zones();
        if !profile_zones.is_empty() {
            zones = Some(match zones {
                None => profile_zones,
                Some(current) => current
                    .into_iter()
                    .filter(|z| profile_zones.contains(z))
                    .collect(),
            });
            if zones.as_ref().is_some_and(Vec::is_empty) {
                return Err(Error::validation(format!(
                    "requested networks share no zone (conflict at {})",
                    attachment.network
                )));
            }
        }

        requests.push(NetworkRequest::from_attachment(&profile, attachment));
    }

    Ok(RequestedNetworks {
        zones: zones.unwrap_or_default(),
        requests,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        NetworkProfileSpec, NetworkProfileStatus, ProfileSelector, ReadinessStatus, VSwitch,
    };
    use crate::store::MockProfileStore;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement;
    use std::time::Duration;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn match_labels(pairs: &[(&str, &str)]) -> LabelSelector {
        LabelSelector {
            match_labels: Some(labels(pairs)),
            ..Default::default()
        }
    }

    fn profile(
        name: &str,
        status: ReadinessStatus,
        pod_selector: Option<LabelSelector>,
        namespace_selector: Option<LabelSelector>,
        zones: &[&str],
    ) -> NetworkProfile {
        let mut p = NetworkProfile::new(
            name,
            NetworkProfileSpec {
                selector: ProfileSelector {
                    pod_selector,
                    namespace_selector,
                },
                ..Default::default()
            },
        );
        p.status = Some(NetworkProfileStatus {
            status,
            vswitches: zones
                .iter()
                .enumerate()
                .map(|(i, z)| VSwitch {
                    id: format!("vsw-{i}"),
                    zone: z.to_string(),
                })
                .collect(),
            ..Default::default()
        });
        p
    }

    fn pod(pairs: &[(&str, &str)]) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some("web-0".to_string());
        pod.metadata.labels = Some(labels(pairs));
        pod
    }

    fn deadline() -> ReadDeadline {
        ReadDeadline::after(Duration::from_secs(5))
    }

    fn store_listing(profiles: Vec<NetworkProfile>) -> MockProfileStore {
        let mut store = MockProfileStore::new();
        store
            .expect_list_network_profiles()
            .returning(move || Ok(profiles.clone()));
        store
    }

    fn name_of(found: Option<NetworkProfile>) -> Option<String> {
        found.and_then(|p| p.metadata.name)
    }

    #[tokio::test]
    async fn no_profiles_is_no_match() {
        let store = store_listing(vec![]);
        let found = find_applicable_profile(&store, &deadline(), "ns", &pod(&[]))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn not_ready_profiles_are_skipped() {
        let store = store_listing(vec![
            profile("pending", ReadinessStatus::Pending, None, None, &[]),
            profile("failed", ReadinessStatus::Failed, None, None, &[]),
            profile("ready", ReadinessStatus::Ready, None, None, &[]),
        ]);
        let found = find_applicable_profile(&store, &deadline(), "ns", &pod(&[]))
            .await
            .unwrap();
        assert_eq!(name_of(found).as_deref(), Some("ready"));
    }

    #[tokio::test]
    async fn profile_without_status_is_skipped() {
        let mut p = profile("fresh", ReadinessStatus::Ready, None, None, &[]);
        p.status = None;
        let store = store_listing(vec![p]);
        let found = find_applicable_profile(&store, &deadline(), "ns", &pod(&[]))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    /// Story: the first matching profile in listing order wins
    #[tokio::test]
    async fn story_first_match_in_listing_order() {
        let store = store_listing(vec![
            profile(
                "other-app",
                ReadinessStatus::Ready,
                Some(match_labels(&[("app", "y")])),
                None,
                &[],
            ),
            profile(
                "first",
                ReadinessStatus::Ready,
                Some(match_labels(&[("app", "x")])),
                None,
                &[],
            ),
            profile(
                "second",
                ReadinessStatus::Ready,
                Some(match_labels(&[("app", "x")])),
                None,
                &[],
            ),
        ]);
        let found = find_applicable_profile(&store, &deadline(), "ns", &pod(&[("app", "x")]))
            .await
            .unwrap();
        assert_eq!(name_of(found).as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn both_selectors_must_match() {
        let mut store = store_listing(vec![
            profile(
                "wrong-ns",
                ReadinessStatus::Ready,
                Some(match_labels(&[("app", "x")])),
                Some(match_labels(&[("team", "payments")])),
                &[],
            ),
            profile(
                "right-ns",
                ReadinessStatus::Ready,
                Some(match_labels(&[("app", "x")])),
                Some(match_labels(&[("team", "search")])),
                &[],
            ),
        ]);
        // fetched once even though two profiles carry namespace selectors
        store
            .expect_get_namespace_labels()
            .times(1)
            .returning(|ns| {
                assert_eq!(ns, "search");
                Ok(labels(&[("team", "search")]))
            });

        let found = find_applicable_profile(&store, &deadline(), "search", &pod(&[("app", "x")]))
            .await
            .unwrap();
        assert_eq!(name_of(found).as_deref(), Some("right-ns"));
    }

    #[tokio::test]
    async fn namespace_labels_not_read_without_namespace_selector() {
        let mut store = store_listing(vec![profile(
            "pods-only",
            ReadinessStatus::Ready,
            Some(match_labels(&[("app", "x")])),
            None,
            &[],
        )]);
        store.expect_get_namespace_labels().never();
        let found = find_applicable_profile(&store, &deadline(), "ns", &pod(&[("app", "x")]))
            .await
            .unwrap();
        assert!(found.is_some());
    }

    /// Story: one broken profile fails admission instead of being skipped
    #[tokio::test]
    async fn story_malformed_selector_is_a_hard_error() {
        let broken = LabelSelector {
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "app".to_string(),
                operator: "Matches".to_string(),
                values: Some(vec!["x".to_string()]),
            }]),
            ..Default::default()
        };
        let store = store_listing(vec![
            profile("broken", ReadinessStatus::Ready, Some(broken), None, &[]),
            profile("fine", ReadinessStatus::Ready, None, None, &[]),
        ]);
        let err = find_applicable_profile(&store, &deadline(), "ns", &pod(&[("app", "x")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSelector { ref profile, .. } if profile == "broken"));
    }

    #[tokio::test]
    async fn list_errors_propagate() {
        let mut store = MockProfileStore::new();
        store
            .expect_list_network_profiles()
            .returning(|| Err(Error::cancelled("list_network_profiles")));
        let err = find_applicable_profile(&store, &deadline(), "ns", &pod(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }

    fn store_with(profiles: Vec<NetworkProfile>) -> MockProfileStore {
        let mut store = MockProfileStore::new();
        store.expect_get_network_profile().returning(move |name| {
            Ok(profiles
                .iter()
                .find(|p| p.metadata.name.as_deref() == Some(name))
                .cloned())
        });
        store
    }

    fn attach(interface: &str, network: &str) -> AttachmentRequest {
        AttachmentRequest {
            interface_name: interface.to_string(),
            network: network.to_string(),
            ..Default::default()
        }
    }

    /// Story: two requested networks narrow the pod to their shared zones
    #[tokio::test]
    async fn story_requested_networks_intersect_zones() {
        let store = store_with(vec![
            profile("a", ReadinessStatus::Ready, None, None, &["z1", "z2", "z3"]),
            profile("b", ReadinessStatus::Ready, None, None, &["z3", "z2"]),
        ]);
        let resolved = resolve_requested_networks(
            &store,
            &deadline(),
            &[attach("eth0", "a"), attach("eth1", "b")],
        )
        .await
        .unwrap();
        assert_eq!(resolved.zones, vec!["z2", "z3"]);
        assert_eq!(resolved.requests.len(), 2);
        assert_eq!(resolved.requests[1].interface, "eth1");
        assert_eq!(resolved.requests[1].network, "b");
    }

    #[tokio::test]
    async fn profile_without_zones_does_not_constrain() {
        let store = store_with(vec![
            profile("a", ReadinessStatus::Ready, None, None, &[]),
            profile("b", ReadinessStatus::Ready, None, None, &["z1"]),
        ]);
        let resolved = resolve_requested_networks(
            &store,
            &deadline(),
            &[attach("eth0", "a"), attach("eth1", "b")],
        )
        .await
        .unwrap();
        assert_eq!(resolved.zones, vec!["z1"]);
    }

    #[tokio::test]
    async fn disjoint_zones_are_rejected() {
        let store = store_with(vec![
            profile("a", ReadinessStatus::Ready, None, None, &["z1"]),
            profile("b", ReadinessStatus::Ready, None, None, &["z2"]),
        ]);
        let err = resolve_requested_networks(
            &store,
            &deadline(),
            &[attach("eth0", "a"), attach("eth1", "b")],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn missing_or_unready_profile_is_rejected() {
        let store = store_with(vec![profile("a", ReadinessStatus::Pending, None, None, &[])]);

        let err = resolve_requested_networks(&store, &deadline(), &[attach("eth0", "missing")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));

        let err = resolve_requested_networks(&store, &deadline(), &[attach("eth0", "a")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not ready"));
    }
}
