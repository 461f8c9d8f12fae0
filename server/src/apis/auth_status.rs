use super::{bearer::Session, response::AuthStatusResponse, ApiError};
use crate::state::AppState;
use axum::{extract::State, Json};
use libcommon::token_fields::Field;
use std::sync::Arc;

pub async fn auth_status(
  State(state): State<Arc<AppState>>,
  Session(session): Session,
) -> Result<Json<AuthStatusResponse>, ApiError> {
  let identity = &session.claims.identity;
  let license = state
    .license_resolver()?
    .resolve_by_email(identity.email.as_str(), state.crypto.now())
    .await?;
  Ok(Json(AuthStatusResponse {
    authenticated: true,
    user: identity.into(),
    license,
  }))
}
