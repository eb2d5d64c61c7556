//! Mutating admission webhook for pods
//!
//! The API server sends an AdmissionReview for every pod CREATE. The handler
//! runs [`PodMutator`] on a copy of the pod and answers with a JSON patch
//! from the original to the mutated pod.

pub mod pod;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};

use crate::mutation::PodMutator;

/// Shared state for webhook handlers
#[derive(Clone)]
pub struct WebhookState {
    /// Mutation pipeline shared by all requests
    pub mutator: PodMutator,
    /// Budget for the store reads of one admission
    pub admission_timeout: Duration,
}

impl WebhookState {
    /// Create webhook state
    pub fn new(mutator: PodMutator, admission_timeout: Duration) -> Self {
        Self {
            mutator,
            admission_timeout,
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

/// Create the webhook router
///
/// - POST /mutate/pods - mutate pods on admission
/// - GET /healthz - liveness
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/mutate/pods", post(pod::mutate_handler))
        .route("/healthz", get(healthz))
        .with_state(state)
}
