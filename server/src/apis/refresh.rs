use super::{auth_response, bearer::BearerToken, response::AuthResponse, ApiError};
use crate::{log::*, state::AppState};
use axum::{extract::State, Json};
use libcommon::token_fields::Field;
use std::sync::Arc;

/// Re-resolve the license and re-issue both tokens. The session may be up to 7 days past expiry.
pub async fn refresh(
  State(state): State<Arc<AppState>>,
  BearerToken(token): BearerToken,
) -> Result<Json<AuthResponse>, ApiError> {
  let session = state.crypto.verifier().verify_session_for_refresh(&token)?;
  let identity = &session.claims.identity;
  if session.stale {
    debug!("[{}] Refreshing an expired session within grace", identity.subject.as_str());
  }
  let license = state
    .license_resolver()?
    .resolve_by_email(identity.email.as_str(), state.crypto.now())
    .await?;
  Ok(Json(auth_response(&state, identity, license)?))
}
