use thiserror::Error;

pub type TokenResult<T> = Result<T, TokenError>;

/// Describes why a token could not be issued or was rejected.
/// The variants are precise for logging; HTTP surfaces collapse them into a single 401.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
  #[error("Malformed token")]
  MalformedToken,
  #[error("Bad signature")]
  BadSignature,
  #[error("Invalid issuer")]
  InvalidIssuer,
  #[error("Invalid audience")]
  InvalidAudience,
  #[error("Token is not yet valid")]
  NotYetValid,
  #[error("No expiration in token")]
  MissingExpiry,
  #[error("Token expired")]
  Expired,
  #[error("Invalid payload shape: {0}")]
  InvalidPayloadShape(String),

  #[error("Invalid key material: {0}")]
  KeyError(String),
  #[error("Failed to sign token: {0}")]
  Signing(String),
}
