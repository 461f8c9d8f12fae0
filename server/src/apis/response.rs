use crate::checkout::DisplayPrice;
use libcommon::{token_fields::*, Identity, LicenseSnapshot, Region};
use serde::Serialize;

#[derive(Serialize, Debug, Clone)]
pub struct UserInfo {
  pub id: String,
  pub email: String,
  pub name: Option<String>,
  pub picture: Option<String>,
}

impl From<&Identity> for UserInfo {
  fn from(identity: &Identity) -> Self {
    Self {
      id: identity.subject.as_str().to_string(),
      email: identity.email.as_str().to_string(),
      name: identity.name.clone(),
      picture: identity.picture.clone(),
    }
  }
}

#[derive(Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum CheckoutOutcome {
  Created { url: String },
  Failed { error: String, code: Option<String> },
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
  pub user: UserInfo,
  pub license: LicenseSnapshot,
  pub session_token: SignedToken,
  pub entitlement_token: SignedToken,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub checkout: Option<CheckoutOutcome>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DesktopCodeResponse {
  pub desktop_code: SignedToken,
}

#[derive(Serialize, Debug, Clone)]
pub struct PublicKeyResponse {
  pub algorithm: &'static str,
  pub issuer: String,
  #[serde(rename = "publicKey")]
  pub public_key: String,
  #[serde(rename = "keyId")]
  pub key_id: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct CancelSubscriptionResponse {
  pub success: bool,
  pub message: String,
  pub cancel_at: Option<i64>,
  pub current_period_end: Option<i64>,
}

#[derive(Serialize, Debug, Clone)]
pub struct CheckoutResponse {
  pub url: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct AuthStatusResponse {
  pub authenticated: bool,
  pub user: UserInfo,
  pub license: LicenseSnapshot,
}

#[derive(Serialize, Debug, Clone)]
pub struct PricingResponse {
  pub region: Region,
  pub currency: &'static str,
  pub pro: DisplayPrice,
  pub lifetime: DisplayPrice,
}

#[derive(Serialize, Debug, Clone)]
pub struct WebhookResponse {
  pub received: bool,
}
