use super::{
  auth_response,
  extract::JsonBody,
  request::{GoogleLoginRequest, LoginFlow, PendingCheckout},
  response::{CheckoutOutcome, DesktopCodeResponse},
  ApiError,
};
use crate::{
  log::*,
  providers::{billing::Customer, identity::IdentityAssertion, ProviderError},
  state::AppState,
};
use axum::{
  extract::State,
  response::{IntoResponse, Response},
  Json,
};
use libcommon::{
  token_fields::{Email, Field, Subject, TryNewField},
  Identity, LicenseSnapshot, Region,
};
use std::sync::Arc;

/// Only verified fields of the assertion are carried forward
fn identity_from_assertion(assertion: IdentityAssertion) -> Result<Identity, ApiError> {
  if !assertion.email_verified {
    return Err(ApiError::EmailNotVerified);
  }
  let Some(email) = assertion.email else {
    return Err(ApiError::IdentityAssertionInvalid);
  };
  let (Ok(subject), Ok(email)) = (Subject::new(&assertion.subject), Email::new(&email)) else {
    return Err(ApiError::IdentityAssertionInvalid);
  };
  Ok(Identity {
    subject,
    email,
    name: assertion.name,
    picture: assertion.picture,
  })
}

/// Run a checkout remembered from before login. Failures are reported, never fatal to the login.
async fn resume_checkout(
  state: &AppState,
  customer: &Customer,
  license: &LicenseSnapshot,
  pending: PendingCheckout,
) -> CheckoutOutcome {
  let region = Region::from_locale(pending.locale.as_deref());
  let res = match state.checkout() {
    Ok(checkout) => checkout
      .create(customer, license, pending.plan, region)
      .await
      .map_err(ApiError::from),
    Err(e) => Err(e),
  };
  match res {
    Ok(url) => CheckoutOutcome::Created { url },
    Err(e) => {
      warn!("[{}] Pending checkout not created: {e}", customer.id);
      CheckoutOutcome::Failed {
        error: e.public_message(),
        code: e.code().map(str::to_string),
      }
    }
  }
}

pub async fn auth_google(
  State(state): State<Arc<AppState>>,
  JsonBody(request): JsonBody<GoogleLoginRequest>,
) -> Result<Response, ApiError> {
  let assertion = state.identity()?.verify(&request.id_token).await.map_err(|e| match e {
    ProviderError::Rejected { .. } | ProviderError::Decode(_) => {
      debug!("Identity assertion rejected: {e}");
      ApiError::IdentityAssertionInvalid
    }
    e => e.into(),
  })?;
  let audience = assertion.audience.clone();
  let identity = identity_from_assertion(assertion)?;
  info!("[{}] Identity verified for client {audience}", identity.subject.as_str());

  let resolver = state.license_resolver()?;
  let customer = resolver.find_or_create_customer(&identity).await?;

  if request.flow == LoginFlow::Desktop {
    // the license is resolved when the desktop app redeems the code
    let desktop_code = state.crypto.signer.issue_desktop_code(&identity, request.nonce.as_ref())?;
    return Ok(Json(DesktopCodeResponse { desktop_code }).into_response());
  }

  let license = resolver.resolve(&customer, state.crypto.now()).await;

  let mut response = auth_response(&state, &identity, license.clone())?;
  if let Some(pending) = request.pending_checkout {
    response.checkout = Some(resume_checkout(&state, &customer, &license, pending).await);
  }
  Ok(Json(response).into_response())
}
