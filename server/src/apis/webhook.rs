use super::{response::WebhookResponse, ApiError};
use crate::{
  constants::STRIPE_SIGNATURE_HEADER,
  log::*,
  state::AppState,
  webhook::{apply_patch, patch_for_event, verify_signature, Event},
};
use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use std::sync::Arc;

/// Billing provider push events. Nothing is touched unless the signature verifies.
pub async fn stripe_webhook(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
  let secret = state.webhook_secret()?;
  let billing = state.billing()?;
  let Some(Ok(signature)) = headers.get(STRIPE_SIGNATURE_HEADER).map(|v| v.to_str()) else {
    return Err(ApiError::WebhookSignatureInvalid);
  };
  if let Err(e) = verify_signature(signature, &body, secret, state.crypto.now()) {
    warn!("Webhook signature rejected: {e}");
    return Err(ApiError::WebhookSignatureInvalid);
  }

  let event: Event = serde_json::from_slice(&body).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
  debug!("Webhook event {} ({})", event.id, event.kind);
  match patch_for_event(&event, state.crypto.now()) {
    Some(patch) => match apply_patch(billing, &patch).await {
      Ok(true) => info!("[{}] Metadata updated from {}", patch.customer_id, event.kind),
      Ok(false) => (),
      Err(e) => error!("[{}] Failed to apply {}: {e}", patch.customer_id, event.kind),
    },
    None => debug!("Ignoring webhook event {}", event.kind),
  }
  Ok(Json(WebhookResponse { received: true }))
}
