use super::{response::PublicKeyResponse, ApiError};
use crate::state::AppState;
use axum::{extract::State, Json};
use libcommon::{token_fields::Field, TOKEN_ALGORITHM};
use std::sync::Arc;

/// Everything a relying party needs to verify tokens offline
pub async fn public_key(State(state): State<Arc<AppState>>) -> Result<Json<PublicKeyResponse>, ApiError> {
  let verifier = state.crypto.verifier();
  let key = verifier.validation_key();
  let public_key = key.to_pem().map_err(|e| ApiError::Internal(e.to_string()))?;
  let key_id = key.key_id().map_err(|e| ApiError::Internal(e.to_string()))?;
  Ok(Json(PublicKeyResponse {
    algorithm: TOKEN_ALGORITHM,
    issuer: verifier.issuer().as_str().to_string(),
    public_key,
    key_id,
  }))
}
