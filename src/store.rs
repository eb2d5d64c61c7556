//! Read access to profiles, attachment records and namespaces
//!
//! The webhook never writes cluster state. Everything it needs goes through
//! [`ProfileStore`] so the mutation logic can be tested without an API
//! server.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{AttachmentRecord, NetworkProfile};
use crate::{Error, Result};

/// Default connection timeout for the kube client
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for the kube client
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait abstracting the reads the webhook performs
///
/// "Not found" is reported as `None` (or empty labels), never as an error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// List every NetworkProfile, in listing order
    async fn list_network_profiles(&self) -> Result<Vec<NetworkProfile>>;

    /// Get a NetworkProfile by name
    async fn get_network_profile(&self, name: &str) -> Result<Option<NetworkProfile>>;

    /// Get the AttachmentRecord for a pod identity
    async fn get_attachment_record(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<AttachmentRecord>>;

    /// Labels of a namespace; empty when the namespace does not exist
    async fn get_namespace_labels(&self, namespace: &str) -> Result<BTreeMap<String, String>>;
}

/// Store backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeProfileStore {
    client: Client,
}

impl KubeProfileStore {
    /// Create a store wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn not_found_as_none<T>(result: std::result::Result<T, kube::Error>) -> Result<Option<T>> {
    match result {
        Ok(obj) => Ok(Some(obj)),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl ProfileStore for KubeProfileStore {
    async fn list_network_profiles(&self) -> Result<Vec<NetworkProfile>> {
        let api: Api<NetworkProfile> = Api::all(self.client.clone());
        // resourceVersion=0 lets the API server answer from its watch cache
        let list = api.list(&ListParams::default().match_any()).await?;
        Ok(list.items)
    }

    async fn get_network_profile(&self, name: &str) -> Result<Option<NetworkProfile>> {
        let api: Api<NetworkProfile> = Api::all(self.client.clone());
        not_found_as_none(api.get(name).await)
    }

    async fn get_attachment_record(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<AttachmentRecord>> {
        let api: Api<AttachmentRecord> = Api::namespaced(self.client.clone(), namespace);
        not_found_as_none(api.get(name).await)
    }

    async fn get_namespace_labels(&self, namespace: &str) -> Result<BTreeMap<String, String>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match not_found_as_none(api.get(namespace).await)? {
            Some(ns) => Ok(ns.metadata.labels.unwrap_or_default()),
            None => {
                debug!(namespace = %namespace, "namespace not found, using empty labels");
                Ok(BTreeMap::new())
            }
        }
    }
}

/// Create a kube client from an optional kubeconfig path
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|e| Error::config(format!("failed to read kubeconfig: {}", e)))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::config(format!("failed to load kubeconfig: {}", e)))?
        }
        None => Config::infer()
            .await
            .map_err(|e| Error::config(format!("failed to infer config: {}", e)))?,
    };
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    Client::try_from(config).map_err(|e| Error::config(format!("failed to create client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: "Test".to_string(),
            code,
        })
    }

    #[test]
    fn not_found_is_absence() {
        let result: Result<Option<()>> = not_found_as_none(Err(api_error(404)));
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn other_api_errors_propagate() {
        let result: Result<Option<()>> = not_found_as_none(Err(api_error(500)));
        assert!(matches!(result, Err(Error::Kube { .. })));
    }

    #[test]
    fn found_is_some() {
        assert_eq!(not_found_as_none(Ok(7)).unwrap(), Some(7));
    }
}
