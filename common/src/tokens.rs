use crate::{
  claims::*,
  codec::{RawClaims, TokenSigner, TokenVerifier, VerifiedToken, VerifyOptions},
  constants::session_refresh_grace,
  error::{TokenError, TokenResult},
  license::LicenseSnapshot,
  token_fields::*,
};
use tracing::{debug, info};

fn typed<T: TypedClaims>(raw: RawClaims) -> TokenResult<T> {
  let claims: T = serde_json::from_value(serde_json::Value::Object(raw))
    .map_err(|e| TokenError::InvalidPayloadShape(e.to_string()))?;
  if claims.kind() != T::KIND {
    return Err(TokenError::InvalidPayloadShape(format!(
      "expected {:?} token, got {:?}",
      T::KIND,
      claims.kind()
    )));
  }
  claims.check_shape().map_err(TokenError::InvalidPayloadShape)?;
  Ok(claims)
}

impl TokenSigner {
  fn issue<T: TypedClaims>(&self, claims: &T) -> TokenResult<SignedToken> {
    self.encode(claims, T::KIND.audience(), T::KIND.ttl())
  }

  /// Session token for the `api` audience, valid for 30 days
  pub fn issue_session(&self, identity: &Identity) -> TokenResult<SignedToken> {
    let token = self.issue(&SessionClaims::new(identity))?;
    info!("[{}] Issued a session token", identity.subject.as_str());
    Ok(token)
  }

  /// Entitlement token for the `desktop` audience, recomputed from the snapshot on every call
  pub fn issue_entitlement(&self, identity: &Identity, license: &LicenseSnapshot) -> TokenResult<SignedToken> {
    let token = self.issue(&EntitlementClaims::new(identity, license))?;
    info!(
      "[{}] Issued an entitlement token: active={}, plan={:?}",
      identity.subject.as_str(),
      license.active,
      license.plan
    );
    Ok(token)
  }

  /// One-time desktop exchange code for the `desktop-exchange` audience, valid for 120 seconds
  pub fn issue_desktop_code(&self, identity: &Identity, nonce: Option<&Nonce>) -> TokenResult<SignedToken> {
    let token = self.issue(&DesktopCodeClaims::new(identity, nonce))?;
    info!(
      "[{}] Issued a desktop exchange code (nonce bound: {})",
      identity.subject.as_str(),
      nonce.is_some()
    );
    Ok(token)
  }
}

impl TokenVerifier {
  fn verify<T: TypedClaims>(&self, token: &str, opts: &VerifyOptions) -> TokenResult<VerifiedToken<T>> {
    let res = self.decode(token, T::KIND.audience(), opts).and_then(|v| v.try_map(typed::<T>));
    if let Err(e) = &res {
      debug!("Rejected {:?} token: {e}", T::KIND);
    }
    res
  }

  /// Verify a session token for ordinary authenticated requests
  pub fn verify_session(&self, token: &str) -> TokenResult<VerifiedToken<SessionClaims>> {
    self.verify(token, &VerifyOptions::default())
  }

  /// Verify a session token for the refresh endpoint only: accepted up to 7 days past expiry
  pub fn verify_session_for_refresh(&self, token: &str) -> TokenResult<VerifiedToken<SessionClaims>> {
    self.verify(token, &VerifyOptions::with_grace(session_refresh_grace()))
  }

  pub fn verify_entitlement(&self, token: &str) -> TokenResult<VerifiedToken<EntitlementClaims>> {
    self.verify(token, &VerifyOptions::default())
  }

  pub fn verify_desktop_code(&self, token: &str) -> TokenResult<VerifiedToken<DesktopCodeClaims>> {
    self.verify(token, &VerifyOptions::default())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    constants::*,
    keys::{tests::RSA_PRIVATE_KEY, SigningKey},
    license::Plan,
  };
  use chrono::{DateTime, Duration, Utc};
  use serde_json::json;
  use std::sync::Arc;

  fn fixed(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap()
  }

  fn signer_at(t: DateTime<Utc>) -> anyhow::Result<TokenSigner> {
    let signer = TokenSigner::new(SigningKey::from_pem(RSA_PRIVATE_KEY)?, Issuer::new("recordsaas")?);
    Ok(signer.with_clock(Arc::new(move || t)))
  }

  fn alice() -> anyhow::Result<Identity> {
    Ok(Identity {
      subject: Subject::new("google-oauth2|1234")?,
      email: Email::new("alice@example.com")?,
      name: Some("Alice".to_string()),
      picture: None,
    })
  }

  #[test]
  fn session_round_trip() -> anyhow::Result<()> {
    let issued = fixed(1_760_000_000);
    let signer = signer_at(issued)?;
    let token = signer.issue_session(&alice()?)?;
    let verified = signer.verifier().verify_session(token.as_str())?;
    assert_eq!(verified.claims.identity, alice()?);
    assert_eq!(verified.claims.kind, TokenKind::Session);
    assert_eq!(verified.expires_at, issued + Duration::seconds(SESSION_TTL_SECS));
    Ok(())
  }

  #[test]
  fn desktop_code_carries_nonce_and_short_ttl() -> anyhow::Result<()> {
    let issued = fixed(1_760_000_000);
    let signer = signer_at(issued)?;
    let nonce = Nonce::new("n-123")?;
    let token = signer.issue_desktop_code(&alice()?, Some(&nonce))?;
    let verified = signer.verifier().verify_desktop_code(token.as_str())?;
    assert_eq!(verified.claims.nonce, Some(nonce));
    assert_eq!(verified.expires_at, issued + Duration::seconds(DESKTOP_CODE_TTL_SECS));

    let later = signer_at(issued + Duration::seconds(DESKTOP_CODE_TTL_SECS + 1))?;
    let res = later.verifier().verify_desktop_code(token.as_str());
    assert_eq!(res.unwrap_err(), TokenError::Expired);
    Ok(())
  }

  #[test]
  fn entitlement_mirrors_snapshot() -> anyhow::Result<()> {
    let signer = signer_at(Utc::now())?;
    for active in [true, false] {
      let snapshot = LicenseSnapshot {
        active,
        plan: Some(Plan::Pro),
        license_valid_until: Some(fixed(1_900_000_000)),
        subscription_status: Some("active".to_string()),
        paid_amount: Some(1000),
        paid_currency: Some("usd".to_string()),
        ..Default::default()
      };
      let token = signer.issue_entitlement(&alice()?, &snapshot)?;
      let claims = signer.verifier().verify_entitlement(token.as_str())?.claims;
      assert_eq!(claims.active, active);
      assert_eq!(claims.watermark_required, !active);
      assert_eq!(claims.plan, Some(Plan::Pro));
      assert_eq!(claims.license_valid_until, Some(fixed(1_900_000_000)));
      assert_eq!(claims.paid_amount, Some(1000));
    }
    Ok(())
  }

  #[test]
  fn kinds_cannot_be_swapped() -> anyhow::Result<()> {
    let signer = signer_at(Utc::now())?;
    let verifier = signer.verifier();
    let session = signer.issue_session(&alice()?)?;
    let code = signer.issue_desktop_code(&alice()?, None)?;
    let entitlement = signer.issue_entitlement(&alice()?, &LicenseSnapshot::inactive())?;

    assert_eq!(verifier.verify_desktop_code(session.as_str()).unwrap_err(), TokenError::InvalidAudience);
    assert_eq!(verifier.verify_session(code.as_str()).unwrap_err(), TokenError::InvalidAudience);
    assert_eq!(verifier.verify_session(entitlement.as_str()).unwrap_err(), TokenError::InvalidAudience);
    assert_eq!(verifier.verify_entitlement(session.as_str()).unwrap_err(), TokenError::InvalidAudience);
    Ok(())
  }

  #[test]
  fn wrong_type_or_missing_fields_is_invalid_shape() -> anyhow::Result<()> {
    let signer = signer_at(Utc::now())?;
    let verifier = signer.verifier();

    // right audience, wrong discriminator
    let body = json!({"type": "desktop_code", "sub": "u1", "email": "a@example.com"});
    let token = signer.encode(&body, AUDIENCE_API, session_ttl())?;
    assert!(matches!(
      verifier.verify_session(token.as_str()),
      Err(TokenError::InvalidPayloadShape(_))
    ));

    // missing email
    let body = json!({"type": "session", "sub": "u1"});
    let token = signer.encode(&body, AUDIENCE_API, session_ttl())?;
    assert!(matches!(
      verifier.verify_session(token.as_str()),
      Err(TokenError::InvalidPayloadShape(_))
    ));

    // subject of the wrong type
    let body = json!({"type": "session", "sub": 42, "email": "a@example.com"});
    let token = signer.encode(&body, AUDIENCE_API, session_ttl())?;
    assert!(matches!(
      verifier.verify_session(token.as_str()),
      Err(TokenError::InvalidPayloadShape(_))
    ));

    // inconsistent watermark
    let body = json!({
      "type": "entitlement", "sub": "u1", "email": "a@example.com", "plan": null, "active": true,
      "licenseValidUntil": null, "subscriptionStatus": null, "paidAmount": null, "paidCurrency": null,
      "watermarkRequired": true
    });
    let token = signer.encode(&body, AUDIENCE_DESKTOP, entitlement_ttl())?;
    assert!(matches!(
      verifier.verify_entitlement(token.as_str()),
      Err(TokenError::InvalidPayloadShape(_))
    ));
    Ok(())
  }

  #[test]
  fn refresh_grace_is_seven_days() -> anyhow::Result<()> {
    let issued = fixed(1_760_000_000);
    let token = signer_at(issued)?.issue_session(&alice()?)?;
    let exp = issued + session_ttl();

    let one_second_late = signer_at(exp + Duration::seconds(1))?;
    assert_eq!(
      one_second_late.verifier().verify_session(token.as_str()).unwrap_err(),
      TokenError::Expired
    );
    let verified = one_second_late.verifier().verify_session_for_refresh(token.as_str())?;
    assert!(verified.stale);

    let eight_days_late = signer_at(exp + Duration::days(8))?;
    assert_eq!(
      eight_days_late.verifier().verify_session_for_refresh(token.as_str()).unwrap_err(),
      TokenError::Expired
    );
    Ok(())
  }
}
