//! Pod mutation handler
//!
//! Validation failures (a pod asking for networks it cannot have) are denied
//! with the reason. Every other failure is an HTTP 500, which leaves the
//! decision to the webhook's `failurePolicy`.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use k8s_openapi::api::core::v1::Pod;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::WebhookState;
use crate::metrics::AdmissionTimer;
use crate::mutation::{MutationOutcome, ReadDeadline};
use crate::Error;

/// Error type for webhook operations
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// Mutation failed on a read or a serialization step
    #[error("mutation failed: {0}")]
    Mutation(#[from] Error),

    /// An error occurred during JSON serialization/deserialization
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": message })),
        )
            .into_response()
    }
}

/// Handle a mutating admission review for a pod
pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<Pod>>,
) -> Result<Json<AdmissionReview<DynamicObject>>, WebhookError> {
    let req: AdmissionRequest<Pod> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Ok(Json(AdmissionResponse::invalid(e.to_string()).into_review()));
        }
    };

    let timer = AdmissionTimer::start();
    match mutate_pod(&state, &req).await {
        Ok((response, outcome)) => {
            timer.complete(outcome);
            Ok(Json(response.into_review()))
        }
        Err(WebhookError::Mutation(Error::Validation { message })) => {
            warn!(uid = %req.uid, reason = %message, "Denying pod");
            timer.error("validation");
            Ok(Json(
                AdmissionResponse::from(&req).deny(message).into_review(),
            ))
        }
        Err(e) => {
            let kind = match &e {
                WebhookError::Mutation(inner) => inner.kind(),
                WebhookError::Serialization(_) => "serialization",
            };
            let retryable = matches!(&e, WebhookError::Mutation(inner) if inner.is_retryable());
            error!(uid = %req.uid, error = %e, retryable, "Pod mutation failed");
            timer.error(kind);
            Err(e)
        }
    }
}

async fn mutate_pod(
    state: &WebhookState,
    req: &AdmissionRequest<Pod>,
) -> Result<(AdmissionResponse, &'static str), WebhookError> {
    let Some(original) = &req.object else {
        debug!(uid = %req.uid, "No pod object in request, allowing unchanged");
        return Ok((AdmissionResponse::from(req), "skipped"));
    };

    // CREATE requests for generateName pods may not carry a namespace on the object
    let namespace = req
        .namespace
        .clone()
        .or_else(|| original.metadata.namespace.clone())
        .unwrap_or_default();

    // Reads stop as soon as the API server hangs up and this future is dropped
    let token = CancellationToken::new();
    let _cancel_on_drop = token.clone().drop_guard();
    let deadline = ReadDeadline::new(token, state.admission_timeout);

    let mut pod = original.clone();
    let outcome = state.mutator.mutate(&mut pod, &namespace, &deadline).await?;

    let label = outcome.as_str();
    if !matches!(outcome, MutationOutcome::Mutated { .. }) {
        debug!(uid = %req.uid, outcome = label, "Allowing pod unchanged");
        return Ok((AdmissionResponse::from(req), label));
    }

    let patch = json_patch::diff(&serde_json::to_value(original)?, &serde_json::to_value(&pod)?);
    info!(
        uid = %req.uid,
        namespace = %namespace,
        pod = ?original.metadata.name,
        patch_ops = patch.0.len(),
        "Applying patch to pod"
    );

    let response = AdmissionResponse::from(req)
        .with_patch(patch)
        .map_err(|e| Error::serialization(format!("failed to serialize patch: {e}")))?;
    Ok((response, label))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_errors_are_server_errors() {
        let err = WebhookError::from(Error::cancelled("list_network_profiles"));
        assert!(err.to_string().contains("list_network_profiles"));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let err = WebhookError::Serialization(serde_json::from_str::<()>("invalid").unwrap_err());
        assert!(err.to_string().contains("serialization"));
    }
}
