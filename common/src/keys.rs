use crate::error::{TokenError, TokenResult};
use base64::{engine::general_purpose, Engine as _};
use rsa::{
  pkcs1::DecodeRsaPrivateKey,
  pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding},
  RsaPrivateKey, RsaPublicKey,
};
use sha2::{Digest, Sha256};
use tracing::debug;

/// PEM material coming through environment variables often has its newlines escaped.
fn normalize_pem(pem: &str) -> String {
  pem.trim().trim_matches('"').replace("\\n", "\n")
}

/* -------------------------------- */
/// RS256 signing key
#[derive(Clone)]
pub struct SigningKey {
  inner: RsaPrivateKey,
}

impl SigningKey {
  /// Derive signing key from pem string, either PKCS#8 (`PRIVATE KEY`) or PKCS#1 (`RSA PRIVATE KEY`)
  pub fn from_pem(pem: &str) -> TokenResult<Self> {
    let pem = normalize_pem(pem);
    let inner = match RsaPrivateKey::from_pkcs8_pem(&pem) {
      Ok(key) => {
        debug!("Read PKCS#8 RSA private key");
        key
      }
      Err(_) => {
        let key = RsaPrivateKey::from_pkcs1_pem(&pem)
          .map_err(|e| TokenError::KeyError(format!("Error decoding private key: {e}")))?;
        debug!("Read PKCS#1 RSA private key");
        key
      }
    };
    Ok(Self { inner })
  }

  pub(crate) fn inner(&self) -> &RsaPrivateKey {
    &self.inner
  }

  /// Get validation key from signing key
  pub fn validation_key(&self) -> ValidationKey {
    ValidationKey {
      inner: RsaPublicKey::from(&self.inner),
    }
  }
}

/* -------------------------------- */
/// RS256 validation key, the only thing a relying party needs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationKey {
  inner: RsaPublicKey,
}

impl ValidationKey {
  /// Convert from SPKI pem string (`PUBLIC KEY`)
  pub fn from_pem(pem: &str) -> TokenResult<Self> {
    let pem = normalize_pem(pem);
    let inner =
      RsaPublicKey::from_public_key_pem(&pem).map_err(|e| TokenError::KeyError(format!("Error decoding public key: {e}")))?;
    Ok(Self { inner })
  }

  /// Convert to SPKI pem string
  pub fn to_pem(&self) -> TokenResult<String> {
    self
      .inner
      .to_public_key_pem(LineEnding::LF)
      .map_err(|e| TokenError::KeyError(format!("Error encoding public key: {e}")))
  }

  pub(crate) fn inner(&self) -> &RsaPublicKey {
    &self.inner
  }

  /// Create key id as base64url(sha256(spki der))
  pub fn key_id(&self) -> TokenResult<String> {
    let der = self
      .inner
      .to_public_key_der()
      .map_err(|e| TokenError::KeyError(format!("Error encoding public key: {e}")))?;
    let mut hasher = <Sha256 as Digest>::new();
    hasher.update(der.as_bytes());
    let hash = hasher.finalize();
    Ok(general_purpose::URL_SAFE_NO_PAD.encode(hash))
  }
}
