use crate::{
  constants::{TOKEN_ALGORITHM, TOKEN_TYPE},
  error::{TokenError, TokenResult},
  keys::{SigningKey, ValidationKey},
  token_fields::{Field, Issuer, SignedToken, TryNewField},
};
use chrono::{DateTime, Duration, Utc};
use jwt_compact::{alg::Rsa, AlgorithmExt, Header, UntrustedToken, ValidationError};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Custom part of decoded claims, i.e., everything but `iat`, `exp` and `nbf`
pub type RawClaims = serde_json::Map<String, serde_json::Value>;

/// Source of the current time for issuance and validation
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
  Arc::new(Utc::now)
}

/// Registered claims this codec owns. Callers only supply `body`.
#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
  #[serde(rename = "iss")]
  issuer: &'a str,
  #[serde(rename = "aud")]
  audience: &'a str,
  jti: String,
  #[serde(flatten)]
  body: &'a T,
}

/// Validation options
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
  /// Accept tokens whose `exp` passed no longer than this ago
  pub max_expired_age: Option<Duration>,
}
impl VerifyOptions {
  pub fn with_grace(max_expired_age: Duration) -> Self {
    Self {
      max_expired_age: Some(max_expired_age),
    }
  }
}

#[derive(Debug, Clone)]
/// Claims that passed every check, with the server-assigned fields split out
pub struct VerifiedToken<T> {
  pub claims: T,
  pub jti: Option<String>,
  pub issued_at: Option<DateTime<Utc>>,
  pub expires_at: DateTime<Utc>,
  /// Expired, but within the grace window given by [`VerifyOptions::max_expired_age`]
  pub stale: bool,
}

impl<T> VerifiedToken<T> {
  pub(crate) fn try_map<U, F>(self, f: F) -> TokenResult<VerifiedToken<U>>
  where
    F: FnOnce(T) -> TokenResult<U>,
  {
    Ok(VerifiedToken {
      claims: f(self.claims)?,
      jti: self.jti,
      issued_at: self.issued_at,
      expires_at: self.expires_at,
      stale: self.stale,
    })
  }
}

/// Truncate to whole seconds since that is all the wire format keeps
fn whole_seconds(t: DateTime<Utc>) -> DateTime<Utc> {
  DateTime::from_timestamp(t.timestamp(), 0).unwrap_or(t)
}

/* -------------------------------- */
/// Verifies tokens against a single public key and issuer
#[derive(Clone)]
pub struct TokenVerifier {
  key: ValidationKey,
  issuer: Issuer,
  clock: Clock,
}

impl TokenVerifier {
  pub fn new(key: ValidationKey, issuer: Issuer) -> Self {
    Self {
      key,
      issuer,
      clock: system_clock(),
    }
  }

  /// Build a verifier from what the public key endpoint serves
  pub fn from_public_pem(pem: &str, issuer: &str) -> TokenResult<Self> {
    let key = ValidationKey::from_pem(pem)?;
    let issuer = Issuer::new(issuer).map_err(|e| TokenError::KeyError(e.to_string()))?;
    Ok(Self::new(key, issuer))
  }

  pub fn with_clock(mut self, clock: Clock) -> Self {
    self.clock = clock;
    self
  }

  pub fn validation_key(&self) -> &ValidationKey {
    &self.key
  }

  pub fn issuer(&self) -> &Issuer {
    &self.issuer
  }

  pub(crate) fn now(&self) -> DateTime<Utc> {
    (self.clock)()
  }

  /// Decode and verify a compact token.
  /// Checks run in a fixed order: structure, header, signature, issuer, audience, maturity, expiration.
  pub fn decode(&self, token: &str, expected_audience: &str, opts: &VerifyOptions) -> TokenResult<VerifiedToken<RawClaims>> {
    if token.split('.').count() != 3 {
      return Err(TokenError::MalformedToken);
    }
    let untrusted = UntrustedToken::new(token).map_err(|e| {
      debug!("Failed to parse token: {e}");
      TokenError::MalformedToken
    })?;
    if untrusted.algorithm() != TOKEN_ALGORITHM || untrusted.header().token_type.as_deref() != Some(TOKEN_TYPE) {
      debug!("Unsupported token header: alg={}", untrusted.algorithm());
      return Err(TokenError::MalformedToken);
    }

    // Verify signature
    let validated = Rsa::rs256()
      .validator::<RawClaims>(self.key.inner())
      .validate(&untrusted)
      .map_err(|e| match e {
        ValidationError::MalformedClaims(_) => TokenError::MalformedToken,
        e => {
          debug!("Signature verification failed: {e}");
          TokenError::BadSignature
        }
      })?;
    let claims = validated.claims();

    // validate issuer
    match claims.custom.get("iss").and_then(|v| v.as_str()) {
      Some(iss) if iss == self.issuer.as_str() => (),
      _ => return Err(TokenError::InvalidIssuer),
    }

    // validate audience, string or array
    let audience_ok = match claims.custom.get("aud") {
      Some(serde_json::Value::String(aud)) => aud == expected_audience,
      Some(serde_json::Value::Array(auds)) => auds.iter().any(|v| v.as_str() == Some(expected_audience)),
      _ => false,
    };
    if !audience_ok {
      return Err(TokenError::InvalidAudience);
    }

    // validate time
    let now = self.now();
    if let Some(nbf) = claims.not_before {
      if nbf > now {
        return Err(TokenError::NotYetValid);
      }
    }
    let Some(expires_at) = claims.expiration else {
      return Err(TokenError::MissingExpiry);
    };
    let stale = if now >= expires_at {
      match opts.max_expired_age {
        Some(grace) if now - expires_at <= grace => true,
        _ => return Err(TokenError::Expired),
      }
    } else {
      false
    };

    Ok(VerifiedToken {
      jti: claims.custom.get("jti").and_then(|v| v.as_str()).map(str::to_owned),
      issued_at: claims.issued_at,
      expires_at,
      stale,
      claims: claims.custom.clone(),
    })
  }
}

/* -------------------------------- */
/// Issues tokens with the configured key pair. Also verifies, since it owns the public half.
#[derive(Clone)]
pub struct TokenSigner {
  signing_key: SigningKey,
  verifier: TokenVerifier,
}

impl TokenSigner {
  pub fn new(signing_key: SigningKey, issuer: Issuer) -> Self {
    let verifier = TokenVerifier::new(signing_key.validation_key(), issuer);
    Self { signing_key, verifier }
  }

  pub fn with_clock(mut self, clock: Clock) -> Self {
    self.verifier = self.verifier.with_clock(clock);
    self
  }

  pub fn verifier(&self) -> &TokenVerifier {
    &self.verifier
  }

  pub fn issuer(&self) -> &Issuer {
    self.verifier.issuer()
  }

  /// Sign `body` for `audience`. `iss`, `aud`, `jti`, `iat`, `nbf` and `exp` are always set here.
  pub fn encode<T: Serialize>(&self, body: &T, audience: &str, ttl: Duration) -> TokenResult<SignedToken> {
    let now = whole_seconds(self.verifier.now());
    let envelope = Envelope {
      issuer: self.issuer().as_str(),
      audience,
      jti: Uuid::new_v4().to_string(),
      body,
    };
    let mut claims = jwt_compact::Claims::new(envelope);
    claims.issued_at = Some(now);
    claims.not_before = Some(now);
    claims.expiration = Some(now + ttl);

    let header = Header::empty().with_token_type(TOKEN_TYPE);
    let token = Rsa::rs256()
      .token(&header, &claims, self.signing_key.inner())
      .map_err(|e| TokenError::Signing(e.to_string()))?;
    SignedToken::new(token).map_err(|e| TokenError::Signing(e.to_string()))
  }
}
