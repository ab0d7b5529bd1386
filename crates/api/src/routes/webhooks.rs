//! Gateway webhook receiver.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use checkout::WebhookOutcome;
use domain::PaymentProvider;
use serde::Serialize;
use store::CommerceStore;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct WebhookAck {
    pub received: bool,
    /// `paid`, `failed`, `ignored` or `acknowledged`.
    pub outcome: &'static str,
}

/// POST /webhooks/{provider}
///
/// The body is taken raw; signatures are computed over the exact bytes sent.
#[tracing::instrument(skip(state, headers, body), fields(bytes = body.len()))]
pub async fn receive<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let provider: PaymentProvider = provider
        .parse()
        .map_err(|_| ApiError::NotFound(format!("No webhook endpoint for {provider}")))?;

    let header = state.webhooks.signature_header(provider)?;
    let signature = headers.get(header).and_then(|v| v.to_str().ok());

    let outcome = state
        .webhooks
        .process(provider, &body, signature)
        .await?;

    let outcome = match outcome {
        WebhookOutcome::Paid { .. } => "paid",
        WebhookOutcome::Failed { .. } => "failed",
        WebhookOutcome::Ignored { .. } => "ignored",
        WebhookOutcome::Acknowledged { .. } | WebhookOutcome::Unroutable { .. } => "acknowledged",
    };

    Ok(Json(WebhookAck {
        received: true,
        outcome,
    }))
}

