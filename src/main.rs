//! podnet-webhook - mutating admission webhook for pod ENI networking

use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use kube::CustomResourceExt;
use tracing::info;

use podnet_admission::config::WebhookConfig;
use podnet_admission::crd::{AttachmentRecord, NetworkProfile};
use podnet_admission::mutation::PodMutator;
use podnet_admission::store::{create_client, KubeProfileStore};
use podnet_admission::telemetry::init_telemetry;
use podnet_admission::webhook::{webhook_router, WebhookState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let config = WebhookConfig::parse();
    config.validate()?;

    if config.crd {
        for crd in [NetworkProfile::crd(), AttachmentRecord::crd()] {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    init_telemetry(&config.telemetry())?;

    let client = create_client(config.kubeconfig.as_deref()).await?;
    let store = Arc::new(KubeProfileStore::new(client));
    let owners = Arc::new(config.owner_registry());
    let mutator = PodMutator::new(store, owners, config.enable_trunk);
    let state = Arc::new(WebhookState::new(mutator, config.admission_timeout()));

    let (Some(cert), Some(key)) = (&config.tls_cert, &config.tls_key) else {
        anyhow::bail!("--tls-cert and --tls-key are required");
    };
    let tls_config = RustlsConfig::from_pem_file(cert, key)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load TLS config: {}", e))?;

    info!(
        addr = %config.listen_addr,
        trunk = config.enable_trunk,
        timeout_secs = config.admission_timeout_secs,
        "Starting pod admission webhook"
    );

    axum_server::bind_rustls(config.listen_addr, tls_config)
        .serve(webhook_router(state).into_make_service())
        .await?;

    Ok(())
}
