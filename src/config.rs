//! Command-line and environment configuration
//!
//! Parsed once at startup. Everything derived from it (the owner-kind
//! registry, the trunk flag, the admission timeout) is shared read-only.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::owner::OwnerKindRegistry;
use crate::telemetry::{LogFormat, TelemetryConfig, DEFAULT_LOG_FILTER, SERVICE_NAME};
use crate::{Error, Result};

/// podnet-webhook - mutating admission webhook for pod ENI networking
#[derive(Parser, Debug, Clone)]
#[command(name = "podnet-webhook", version, about, long_about = None)]
pub struct WebhookConfig {
    /// Print the CRD manifests and exit
    #[arg(long)]
    pub crd: bool,

    /// Address the HTTPS server listens on
    #[arg(long, env = "PODNET_LISTEN_ADDR", default_value = "0.0.0.0:9443")]
    pub listen_addr: SocketAddr,

    /// PEM certificate served to the API server
    #[arg(long, env = "PODNET_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key for `--tls-cert`
    #[arg(long, env = "PODNET_TLS_KEY")]
    pub tls_key: Option<PathBuf>,

    /// Request trunk-member ENIs when profiles allow it
    #[arg(long, env = "PODNET_ENABLE_TRUNK")]
    pub enable_trunk: bool,

    /// Budget for the store reads of one admission, in seconds
    ///
    /// Keep this below the webhook's `timeoutSeconds` so the webhook answers
    /// before the API server gives up on it.
    #[arg(long, env = "PODNET_ADMISSION_TIMEOUT_SECS", default_value = "10")]
    pub admission_timeout_secs: u64,

    /// Owner kinds whose pods keep their name when recreated
    #[arg(
        long,
        env = "PODNET_STABLE_OWNER_KINDS",
        value_delimiter = ',',
        default_value = "StatefulSet"
    )]
    pub stable_owner_kinds: Vec<String>,

    /// Owner kinds that run one pod per node
    #[arg(
        long,
        env = "PODNET_NODE_LOCAL_OWNER_KINDS",
        value_delimiter = ',',
        default_value = "DaemonSet"
    )]
    pub node_local_owner_kinds: Vec<String>,

    /// Path to a kubeconfig; in-cluster config is used when unset
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Log line format
    #[arg(long, env = "PODNET_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Log filter directives; `RUST_LOG` takes precedence
    #[arg(long, env = "PODNET_LOG_FILTER", default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,

    /// OTLP collector endpoint for spans and metrics
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl WebhookConfig {
    /// Check settings that clap cannot express
    pub fn validate(&self) -> Result<()> {
        if self.admission_timeout_secs == 0 {
            return Err(Error::config("--admission-timeout-secs must be positive"));
        }
        if !self.crd && (self.tls_cert.is_none() || self.tls_key.is_none()) {
            return Err(Error::config("--tls-cert and --tls-key are required"));
        }
        Ok(())
    }

    /// The per-admission read budget
    pub fn admission_timeout(&self) -> Duration {
        Duration::from_secs(self.admission_timeout_secs)
    }

    /// Logging and export settings
    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: SERVICE_NAME.to_string(),
            log_filter: self.log_filter.clone(),
            log_format: self.log_format,
            otlp_endpoint: self.otlp_endpoint.clone().filter(|e| !e.is_empty()),
        }
    }

    /// Owner-kind taxonomy from the configured kind lists
    pub fn owner_registry(&self) -> OwnerKindRegistry {
        let clean = |kinds: &[String]| -> Vec<String> {
            kinds
                .iter()
                .map(|k| k.trim())
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect()
        };
        OwnerKindRegistry::new(
            clean(&self.stable_owner_kinds),
            clean(&self.node_local_owner_kinds),
        )
    }
}
