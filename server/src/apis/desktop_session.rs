use super::{
  bearer::Session, extract::OptionalJsonBody, request::DesktopSessionRequest, response::DesktopCodeResponse,
  ApiError,
};
use crate::{log::*, state::AppState};
use axum::{extract::State, Json};
use libcommon::token_fields::Field;
use std::sync::Arc;

/// Downgrade a web session into a one-time code the desktop app can redeem
pub async fn desktop_session(
  State(state): State<Arc<AppState>>,
  Session(session): Session,
  OptionalJsonBody(request): OptionalJsonBody<DesktopSessionRequest>,
) -> Result<Json<DesktopCodeResponse>, ApiError> {
  let identity = &session.claims.identity;
  debug!("[{}] Bridging web session to desktop", identity.subject.as_str());
  let desktop_code = state.crypto.signer.issue_desktop_code(identity, request.nonce.as_ref())?;
  Ok(Json(DesktopCodeResponse { desktop_code }))
}
