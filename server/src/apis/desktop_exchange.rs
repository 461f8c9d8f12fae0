use super::{auth_response, extract::JsonBody, request::DesktopExchangeRequest, response::AuthResponse, ApiError};
use crate::{log::*, state::AppState};
use axum::{extract::State, Json};
use libcommon::{token_fields::Field, DesktopCodeClaims, TokenError, VerifiedToken};
use std::sync::Arc;

/// A nonce bound to the code must be presented again. Codes without one ignore the request nonce.
fn check_nonce(code: &DesktopCodeClaims, presented: Option<&str>) -> Result<(), ApiError> {
  match &code.nonce {
    Some(bound) if Some(bound.as_str()) != presented => Err(ApiError::NonceMismatch),
    _ => Ok(()),
  }
}

fn redeem(state: &AppState, code: &VerifiedToken<DesktopCodeClaims>) -> Result<(), ApiError> {
  let Some(jti) = code.jti.as_deref() else {
    return Err(TokenError::InvalidPayloadShape("desktop code without jti".to_string()).into());
  };
  if !state.redeemed_codes.redeem(jti, code.expires_at, state.crypto.now()) {
    warn!("[{}] Desktop code replayed", code.claims.identity.subject.as_str());
    return Err(ApiError::CodeAlreadyRedeemed);
  }
  Ok(())
}

/// Redeem a desktop code for a full session and entitlement pair
pub async fn desktop_exchange(
  State(state): State<Arc<AppState>>,
  JsonBody(request): JsonBody<DesktopExchangeRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
  let code = state.crypto.verifier().verify_desktop_code(&request.desktop_code)?;
  check_nonce(&code.claims, request.nonce.as_ref().map(|n| n.as_str()))?;
  let resolver = state.license_resolver()?;
  let identity = &code.claims.identity;
  let customer = resolver.find_or_create_customer(identity).await?;
  let license = resolver.resolve(&customer, state.crypto.now()).await;

  // recorded only once tokens can be issued, so a provider outage leaves the code usable
  redeem(&state, &code)?;
  info!("[{}] Desktop code redeemed", identity.subject.as_str());
  Ok(Json(auth_response(&state, identity, license)?))
}

#[cfg(test)]
mod tests {
  use super::*;
  use libcommon::{
    token_fields::{Email, Nonce, Subject, TryNewField},
    Identity,
  };

  fn code(nonce: Option<&str>) -> anyhow::Result<DesktopCodeClaims> {
    let identity = Identity {
      subject: Subject::new("u1")?,
      email: Email::new("a@example.com")?,
      name: None,
      picture: None,
    };
    let nonce = nonce.map(Nonce::new).transpose()?;
    Ok(DesktopCodeClaims::new(&identity, nonce.as_ref()))
  }

  #[test]
  fn nonce_binding() -> anyhow::Result<()> {
    assert!(check_nonce(&code(Some("n1"))?, Some("n1")).is_ok());
    assert!(matches!(check_nonce(&code(Some("n1"))?, Some("n2")), Err(ApiError::NonceMismatch)));
    assert!(matches!(check_nonce(&code(Some("n1"))?, None), Err(ApiError::NonceMismatch)));
    assert!(check_nonce(&code(None)?, Some("anything")).is_ok());
    assert!(check_nonce(&code(None)?, None).is_ok());
    Ok(())
  }
}
