use super::{ProviderError, ProviderResult};
use crate::{constants::GOOGLE_TOKENINFO_URL, log::*};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Verified fields of an identity assertion issued by the external identity provider
pub struct IdentityAssertion {
  pub subject: String,
  pub email: Option<String>,
  pub email_verified: bool,
  pub name: Option<String>,
  pub picture: Option<String>,
  pub audience: String,
}

#[async_trait]
/// Verifies identity assertions (Google ID tokens) issued to this site
pub trait IdentityProvider: Send + Sync {
  /// Returns the assertion only when its signature, expiry and audience are all valid
  async fn verify(&self, id_token: &str) -> ProviderResult<IdentityAssertion>;
}

/// Google `tokeninfo` introspection client
pub struct GoogleIdentityProvider {
  http: reqwest::Client,
  client_id: String,
  endpoint: Url,
}

impl GoogleIdentityProvider {
  pub fn new(http: reqwest::Client, client_id: &str) -> anyhow::Result<Self> {
    Ok(Self {
      http,
      client_id: client_id.to_string(),
      endpoint: Url::parse(GOOGLE_TOKENINFO_URL)?,
    })
  }
}

#[derive(Deserialize)]
struct TokenInfo {
  sub: String,
  aud: String,
  email: Option<String>,
  #[serde(default, deserialize_with = "bool_or_string")]
  email_verified: bool,
  name: Option<String>,
  picture: Option<String>,
}

/// tokeninfo answers `"true"` where the ID token itself carries `true`
fn bool_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum BoolOrString {
    Bool(bool),
    String(String),
  }
  Ok(match BoolOrString::deserialize(deserializer)? {
    BoolOrString::Bool(b) => b,
    BoolOrString::String(s) => s.eq_ignore_ascii_case("true"),
  })
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
  async fn verify(&self, id_token: &str) -> ProviderResult<IdentityAssertion> {
    let res = self
      .http
      .get(self.endpoint.clone())
      .query(&[("id_token", id_token)])
      .send()
      .await?;
    if !res.status().is_success() {
      let status = res.status().as_u16();
      let message = res.text().await.unwrap_or_default();
      return Err(ProviderError::Rejected { status, message });
    }
    let info: TokenInfo = res.json().await?;
    if info.aud != self.client_id {
      debug!("Identity assertion issued for another client: {}", info.aud);
      return Err(ProviderError::Rejected {
        status: 401,
        message: "audience mismatch".to_string(),
      });
    }
    Ok(IdentityAssertion {
      subject: info.sub,
      email: info.email,
      email_verified: info.email_verified,
      name: info.name,
      picture: info.picture,
      audience: info.aud,
    })
  }
}
