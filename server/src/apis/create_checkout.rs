use super::{
  bearer::BearerToken,
  extract::JsonBody,
  request::CreateCheckoutRequest,
  response::CheckoutResponse,
  ApiError,
};
use crate::{log::*, state::AppState};
use axum::{extract::State, Json};
use libcommon::{token_fields::Field, Region};
use std::sync::Arc;

/// Open a checkout session for the signed-in user.
/// Anonymous callers get `LOGIN_REQUIRED` and are expected to resume after login.
pub async fn create_checkout(
  State(state): State<Arc<AppState>>,
  bearer: Option<BearerToken>,
  JsonBody(request): JsonBody<CreateCheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
  let Some(BearerToken(token)) = bearer else {
    return Err(ApiError::LoginRequired);
  };
  let session = state.crypto.verifier().verify_session(&token).map_err(|e| {
    debug!("Checkout with unusable session: {e}");
    ApiError::LoginRequired
  })?;
  let identity = &session.claims.identity;
  if let Some(email) = request.email.as_deref() {
    if !email.eq_ignore_ascii_case(identity.email.as_str()) {
      debug!("[{}] Checkout email differs from session email", identity.subject.as_str());
    }
  }

  let region = Region::from_locale(request.locale.as_deref());
  let resolver = state.license_resolver()?;
  let customer = resolver.find_or_create_customer(identity).await?;
  let license = resolver.resolve(&customer, state.crypto.now()).await;
  let url = state.checkout()?.create(&customer, &license, request.plan, region).await?;
  Ok(Json(CheckoutResponse { url }))
}
