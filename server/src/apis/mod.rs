mod auth_google;
mod auth_status;
mod bearer;
mod cancel_subscription;
mod create_checkout;
mod desktop_exchange;
mod desktop_session;
mod error;
mod extract;
mod health_check;
mod pricing;
mod public_key;
mod refresh;
mod request;
mod response;
mod webhook;

#[cfg(test)]
mod tests;

use crate::{log::*, state::AppState};
use axum::{
  extract::Request,
  http::{header, HeaderValue, Method, StatusCode},
  middleware::{self, Next},
  response::{IntoResponse, Response},
  routing::{get, post},
  Router,
};
use libcommon::{Identity, LicenseSnapshot};
use response::{AuthResponse, UserInfo};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub use error::ApiError;

/// Issue a fresh session and entitlement pair for an identity
fn auth_response(state: &AppState, identity: &Identity, license: LicenseSnapshot) -> Result<AuthResponse, ApiError> {
  let signer = &state.crypto.signer;
  Ok(AuthResponse {
    user: UserInfo::from(identity),
    session_token: signer.issue_session(identity)?,
    entitlement_token: signer.issue_entitlement(identity, &license)?,
    license,
    checkout: None,
  })
}

/// Answer CORS preflight requests before routing
async fn preflight(request: Request, next: Next) -> Response {
  if request.method() != Method::OPTIONS {
    return next.run(request).await;
  }
  let mut res = StatusCode::NO_CONTENT.into_response();
  let headers = res.headers_mut();
  headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
  headers.insert(
    header::ACCESS_CONTROL_ALLOW_METHODS,
    HeaderValue::from_static("GET, POST, OPTIONS"),
  );
  headers.insert(
    header::ACCESS_CONTROL_ALLOW_HEADERS,
    HeaderValue::from_static("Content-Type, Authorization"),
  );
  res
}

pub fn router(shared_state: Arc<AppState>) -> Router {
  let api_routes = Router::new()
    .route("/auth/google", post(auth_google::auth_google))
    .route("/auth/desktop-session", post(desktop_session::desktop_session))
    .route("/auth/desktop-exchange", post(desktop_exchange::desktop_exchange))
    .route("/auth/refresh", post(refresh::refresh))
    .route("/auth/public-key", get(public_key::public_key))
    .route("/auth/status", get(auth_status::auth_status))
    .route("/cancel-subscription", post(cancel_subscription::cancel_subscription))
    .route("/create-checkout", post(create_checkout::create_checkout))
    .route("/pricing", get(pricing::pricing))
    .route("/webhooks/stripe", post(webhook::stripe_webhook))
    .with_state(shared_state);

  let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
  debug!("Routes defined under /api");

  Router::new()
    .route("/health", get(health_check::health_check))
    .nest("/api", api_routes)
    .layer(cors)
    .layer(middleware::from_fn(preflight))
}
