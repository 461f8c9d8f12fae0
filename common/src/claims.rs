use crate::{
  constants::*,
  license::{LicenseSnapshot, Plan},
  token_fields::*,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Value of the `type` claim
pub enum TokenKind {
  Session,
  Entitlement,
  DesktopCode,
}

impl TokenKind {
  /// Each kind is minted for exactly one audience
  pub fn audience(&self) -> &'static str {
    match self {
      TokenKind::Session => AUDIENCE_API,
      TokenKind::Entitlement => AUDIENCE_DESKTOP,
      TokenKind::DesktopCode => AUDIENCE_DESKTOP_EXCHANGE,
    }
  }
  pub fn ttl(&self) -> Duration {
    match self {
      TokenKind::Session => session_ttl(),
      TokenKind::Entitlement => entitlement_ttl(),
      TokenKind::DesktopCode => desktop_code_ttl(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Proven identity carried from the identity provider into our own tokens
pub struct Identity {
  #[serde(rename = "sub")]
  pub subject: Subject,
  pub email: Email,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub picture: Option<String>,
}

/// Claim bodies that the typed layer knows how to issue and verify
pub trait TypedClaims: Serialize + serde::de::DeserializeOwned {
  const KIND: TokenKind;
  fn kind(&self) -> TokenKind;
  /// Extra shape checks beyond what deserialization enforces
  fn check_shape(&self) -> Result<(), String> {
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// "This bearer previously proved identity"
pub struct SessionClaims {
  #[serde(rename = "type")]
  pub kind: TokenKind,
  #[serde(flatten)]
  pub identity: Identity,
}
impl SessionClaims {
  pub fn new(identity: &Identity) -> Self {
    Self {
      kind: TokenKind::Session,
      identity: identity.clone(),
    }
  }
}
impl TypedClaims for SessionClaims {
  const KIND: TokenKind = TokenKind::Session;
  fn kind(&self) -> TokenKind {
    self.kind
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Short-lived handoff of an identity from the browser to the desktop app
pub struct DesktopCodeClaims {
  #[serde(rename = "type")]
  pub kind: TokenKind,
  #[serde(flatten)]
  pub identity: Identity,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub nonce: Option<Nonce>,
}
impl DesktopCodeClaims {
  pub fn new(identity: &Identity, nonce: Option<&Nonce>) -> Self {
    Self {
      kind: TokenKind::DesktopCode,
      identity: identity.clone(),
      nonce: nonce.cloned(),
    }
  }
}
impl TypedClaims for DesktopCodeClaims {
  const KIND: TokenKind = TokenKind::DesktopCode;
  fn kind(&self) -> TokenKind {
    self.kind
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Entitlement derived from a [`LicenseSnapshot`], verified offline by the desktop app
pub struct EntitlementClaims {
  #[serde(rename = "type")]
  pub kind: TokenKind,
  pub sub: Subject,
  pub email: Email,
  pub plan: Option<Plan>,
  pub active: bool,
  pub license_valid_until: Option<DateTime<Utc>>,
  pub subscription_status: Option<String>,
  pub paid_amount: Option<i64>,
  pub paid_currency: Option<String>,
  pub watermark_required: bool,
}
impl EntitlementClaims {
  pub fn new(identity: &Identity, license: &LicenseSnapshot) -> Self {
    Self {
      kind: TokenKind::Entitlement,
      sub: identity.subject.clone(),
      email: identity.email.clone(),
      plan: license.plan,
      active: license.active,
      license_valid_until: license.license_valid_until,
      subscription_status: license.subscription_status.clone(),
      paid_amount: license.paid_amount,
      paid_currency: license.paid_currency.clone(),
      watermark_required: license.watermark_required(),
    }
  }
}
impl TypedClaims for EntitlementClaims {
  const KIND: TokenKind = TokenKind::Entitlement;
  fn kind(&self) -> TokenKind {
    self.kind
  }
  fn check_shape(&self) -> Result<(), String> {
    if self.watermark_required == self.active {
      return Err("watermarkRequired must be the negation of active".to_string());
    }
    Ok(())
  }
}
