use super::ApiError;
use crate::state::AppState;
use axum::{extract::FromRequestParts, http::request::Parts};
use libcommon::{SessionClaims, VerifiedToken};
use std::sync::Arc;

/// Raw `Authorization: Bearer <token>` value
pub struct BearerToken(pub String);

fn parse_bearer(parts: &Parts) -> Option<String> {
  let value = parts.headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
  let mut iter = value.split(' ');
  let Some("Bearer") = iter.next() else {
    return None;
  };
  let token = iter.next()?.trim();
  (!token.is_empty()).then(|| token.to_string())
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for BearerToken {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    parse_bearer(parts).map(BearerToken).ok_or(ApiError::MissingBearer)
  }
}

/// Session token verified strictly, without refresh grace
pub struct Session(pub VerifiedToken<SessionClaims>);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Session {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
    let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
    let verified = state.crypto.verifier().verify_session(&token)?;
    Ok(Session(verified))
  }
}
