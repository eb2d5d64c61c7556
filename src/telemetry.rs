//! Logging, tracing and metrics export for the webhook
//!
//! Logs go to stdout as JSON (for log shippers) or plain text (for a
//! terminal). `RUST_LOG` overrides the configured filter. When an OTLP
//! endpoint is configured, admission spans and the metrics in
//! [`crate::metrics`] are pushed to it as well.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME as SERVICE_NAME_KEY, SERVICE_VERSION};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Service name reported on spans and metrics
pub const SERVICE_NAME: &str = "podnet-webhook";

/// Log filter used when neither `RUST_LOG` nor `--log-filter` is given
pub const DEFAULT_LOG_FILTER: &str = "info,podnet_admission=debug,kube=info,tower=warn,hyper=warn";

/// Downward-API variables copied onto the telemetry resource
const POD_IDENTITY: [(&str, &str); 3] = [
    ("POD_NAME", "k8s.pod.name"),
    ("POD_NAMESPACE", "k8s.namespace.name"),
    ("NODE_NAME", "k8s.node.name"),
];

/// Errors that can occur during telemetry initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The log filter did not parse
    #[error("invalid log filter {filter:?}: {message}")]
    Filter {
        /// The rejected filter
        filter: String,
        /// Parser message
        message: String,
    },

    /// An OTLP exporter could not be built
    #[error("failed to initialize OTLP {signal} exporter: {message}")]
    Exporter {
        /// "traces" or "metrics"
        signal: &'static str,
        /// Exporter error
        message: String,
    },

    /// A global subscriber was already installed
    #[error("failed to initialize tracing subscriber: {0}")]
    Subscriber(String),
}

/// Log line format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable lines
    Text,
}

/// Telemetry settings, normally built by [`crate::config::WebhookConfig::telemetry`]
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to spans and metrics
    pub service_name: String,
    /// Filter directives used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Log line format
    pub log_format: LogFormat,
    /// OTLP collector endpoint; `None` keeps everything local
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: SERVICE_NAME.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            log_format: LogFormat::Json,
            otlp_endpoint: None,
        }
    }
}

impl TelemetryConfig {
    /// `RUST_LOG` if set and non-empty, else the configured filter
    fn env_filter(&self, rust_log: Option<String>) -> Result<EnvFilter, TelemetryError> {
        let filter = rust_log
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| self.log_filter.clone());
        EnvFilter::try_new(&filter).map_err(|e| TelemetryError::Filter {
            filter,
            message: e.to_string(),
        })
    }
}

/// Install the global subscriber and, with an endpoint, the OTLP pipelines
///
/// Call once, before the first log line.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = config.env_filter(std::env::var("RUST_LOG").ok())?;

    let otel_layer = match &config.otlp_endpoint {
        Some(endpoint) => {
            global::set_text_map_propagator(TraceContextPropagator::new());
            let tracer = init_otlp(endpoint, &config.service_name)?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let json_layer = (config.log_format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
    });
    let text_layer = (config.log_format == LogFormat::Text)
        .then(|| tracing_subscriber::fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| TelemetryError::Subscriber(e.to_string()))
}

fn webhook_resource(service_name: &str, lookup: impl Fn(&str) -> Option<String>) -> Resource {
    let mut attributes = vec![
        KeyValue::new(SERVICE_NAME_KEY, service_name.to_string()),
        KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
    ];
    attributes.extend(
        POD_IDENTITY
            .iter()
            .filter_map(|(var, key)| lookup(var).map(|value| KeyValue::new(*key, value))),
    );
    Resource::new(attributes)
}

/// Build span and metric exporters to `endpoint`; returns the webhook's tracer
fn init_otlp(
    endpoint: &str,
    service_name: &str,
) -> Result<opentelemetry_sdk::trace::Tracer, TelemetryError> {
    let resource = webhook_resource(service_name, |var| std::env::var(var).ok());

    let spans = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::Exporter {
            signal: "traces",
            message: e.to_string(),
        })?;
    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(spans, runtime::Tokio)
        .with_resource(resource.clone())
        .build();
    let tracer = tracer_provider.tracer(service_name.to_string());
    global::set_tracer_provider(tracer_provider);

    let metrics = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::Exporter {
            signal: "metrics",
            message: e.to_string(),
        })?;
    let meter_provider = SdkMeterProvider::builder()
        .with_reader(PeriodicReader::builder(metrics, runtime::Tokio).build())
        .with_resource(resource)
        .build();
    global::set_meter_provider(meter_provider);

    Ok(tracer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::Key;

    fn attribute(resource: &Resource, key: &'static str) -> Option<String> {
        resource
            .get(Key::from_static_str(key))
            .map(|v| v.as_str().to_string())
    }

    #[test]
    fn resource_names_the_webhook_pod() {
        let resource = webhook_resource("podnet-webhook-test", |var| match var {
            "POD_NAME" => Some("podnet-webhook-6c9f-x2".to_string()),
            "POD_NAMESPACE" => Some("kube-system".to_string()),
            _ => None,
        });
        assert_eq!(
            attribute(&resource, SERVICE_NAME_KEY).as_deref(),
            Some("podnet-webhook-test")
        );
        assert_eq!(
            attribute(&resource, "k8s.pod.name").as_deref(),
            Some("podnet-webhook-6c9f-x2")
        );
        assert_eq!(
            attribute(&resource, "k8s.namespace.name").as_deref(),
            Some("kube-system")
        );
        assert_eq!(attribute(&resource, "k8s.node.name"), None);
    }

    #[test]
    fn default_filter_parses() {
        let config = TelemetryConfig::default();
        assert!(config.env_filter(None).is_ok());
    }

    #[test]
    fn rust_log_overrides_configured_filter() {
        let config = TelemetryConfig {
            log_filter: "podnet_admission=loud".to_string(),
            ..Default::default()
        };
        assert!(config.env_filter(Some("warn".to_string())).is_ok());
        assert!(config.env_filter(Some("  ".to_string())).is_err());
    }

    #[test]
    fn invalid_filter_is_reported() {
        let config = TelemetryConfig {
            log_filter: "podnet_admission=loud".to_string(),
            ..Default::default()
        };
        let err = config.env_filter(None).unwrap_err();
        assert!(matches!(err, TelemetryError::Filter { .. }));
        assert!(err.to_string().contains("podnet_admission=loud"));
    }
}
