use libcommon::{token_fields::Nonce, Plan, Region};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoginFlow {
  #[default]
  Web,
  Desktop,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PendingCheckout {
  pub plan: Plan,
  pub locale: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GoogleLoginRequest {
  pub id_token: String,
  #[serde(default)]
  pub flow: LoginFlow,
  pub nonce: Option<Nonce>,
  pub pending_checkout: Option<PendingCheckout>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct DesktopSessionRequest {
  pub nonce: Option<Nonce>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DesktopExchangeRequest {
  pub desktop_code: String,
  pub nonce: Option<Nonce>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CreateCheckoutRequest {
  pub plan: Plan,
  pub locale: Option<String>,
  /// Informational only; the session email is authoritative
  pub email: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct PricingQuery {
  pub region: Option<Region>,
}
