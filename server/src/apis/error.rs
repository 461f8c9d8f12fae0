use crate::{checkout::CheckoutError, log::*, providers::ProviderError};
use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use libcommon::TokenError;
use serde_json::json;
use thiserror::Error;

/// Every way an endpoint can fail, mapped to a status and a `{error, code?}` body
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("Invalid token: {0}")]
  Token(#[from] TokenError),
  #[error("Missing or malformed bearer token")]
  MissingBearer,
  #[error("Identity assertion is invalid")]
  IdentityAssertionInvalid,
  #[error("Email is not verified")]
  EmailNotVerified,
  #[error("Desktop code nonce mismatch")]
  NonceMismatch,
  #[error("Desktop code already redeemed")]
  CodeAlreadyRedeemed,
  #[error("Login required")]
  LoginRequired,
  #[error("Invalid request: {0}")]
  InvalidRequest(String),
  #[error("Invalid webhook signature")]
  WebhookSignatureInvalid,
  #[error("An active subscription already exists")]
  ActiveSubscriptionExists,
  #[error("An active lifetime license already exists")]
  ActiveLifetimeExists,
  #[error("No active subscription")]
  NoActiveSubscription,
  #[error("Missing configuration: {0}")]
  ConfigurationMissing(&'static str),
  #[error("Provider unavailable: {0}")]
  ProviderUnavailable(String),
  #[error("Internal error: {0}")]
  Internal(String),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Token(TokenError::KeyError(_) | TokenError::Signing(_)) => StatusCode::INTERNAL_SERVER_ERROR,
      ApiError::Token(_)
      | ApiError::MissingBearer
      | ApiError::IdentityAssertionInvalid
      | ApiError::NonceMismatch
      | ApiError::CodeAlreadyRedeemed
      | ApiError::LoginRequired => StatusCode::UNAUTHORIZED,
      ApiError::EmailNotVerified => StatusCode::FORBIDDEN,
      ApiError::InvalidRequest(_) | ApiError::WebhookSignatureInvalid => StatusCode::BAD_REQUEST,
      ApiError::ActiveSubscriptionExists | ApiError::ActiveLifetimeExists => StatusCode::CONFLICT,
      ApiError::NoActiveSubscription => StatusCode::NOT_FOUND,
      ApiError::ConfigurationMissing(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
      ApiError::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
    }
  }

  pub fn code(&self) -> Option<&'static str> {
    match self {
      ApiError::LoginRequired => Some("LOGIN_REQUIRED"),
      ApiError::ActiveSubscriptionExists => Some("ACTIVE_SUBSCRIPTION_EXISTS"),
      ApiError::ActiveLifetimeExists => Some("ACTIVE_LIFETIME_EXISTS"),
      ApiError::NoActiveSubscription => Some("NO_ACTIVE_SUBSCRIPTION"),
      _ => None,
    }
  }

  /// Message shown to clients. Token failures stay generic.
  pub fn public_message(&self) -> String {
    match self {
      ApiError::Token(TokenError::KeyError(_) | TokenError::Signing(_)) => "Internal server error".to_string(),
      ApiError::Token(_) | ApiError::MissingBearer | ApiError::NonceMismatch | ApiError::CodeAlreadyRedeemed => {
        "Unauthorized".to_string()
      }
      ApiError::ConfigurationMissing(_) => "Server is not configured".to_string(),
      ApiError::ProviderUnavailable(_) => "Upstream provider unavailable".to_string(),
      ApiError::Internal(_) => "Internal server error".to_string(),
      e => e.to_string(),
    }
  }

  /// `{error, code?}`
  pub fn body(&self) -> serde_json::Value {
    match self.code() {
      Some(code) => json!({ "error": self.public_message(), "code": code }),
      None => json!({ "error": self.public_message() }),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!("{self}");
    } else {
      debug!("Request rejected: {self}");
    }
    (status, Json(self.body())).into_response()
  }
}

impl From<ProviderError> for ApiError {
  fn from(e: ProviderError) -> Self {
    ApiError::ProviderUnavailable(e.to_string())
  }
}

impl From<CheckoutError> for ApiError {
  fn from(e: CheckoutError) -> Self {
    match e {
      CheckoutError::ActiveSubscriptionExists => ApiError::ActiveSubscriptionExists,
      CheckoutError::ActiveLifetimeExists => ApiError::ActiveLifetimeExists,
      CheckoutError::Provider(e) => e.into(),
      e => ApiError::Internal(e.to_string()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn token_errors_are_generic_401() {
    for e in [TokenError::BadSignature, TokenError::Expired, TokenError::InvalidAudience] {
      let api: ApiError = e.into();
      assert_eq!(api.status(), StatusCode::UNAUTHORIZED);
      assert_eq!(api.body(), json!({"error": "Unauthorized"}));
    }
    let api: ApiError = TokenError::Signing("bad key".to_string()).into();
    assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(api.body(), json!({"error": "Internal server error"}));
  }

  #[test]
  fn conflicts_carry_codes() {
    let e: ApiError = CheckoutError::ActiveLifetimeExists.into();
    assert_eq!(e.status(), StatusCode::CONFLICT);
    assert_eq!(e.body()["code"], "ACTIVE_LIFETIME_EXISTS");
    assert_eq!(ApiError::LoginRequired.body()["code"], "LOGIN_REQUIRED");
    assert_eq!(ApiError::EmailNotVerified.status(), StatusCode::FORBIDDEN);
  }
}
