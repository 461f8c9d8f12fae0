use crate::{
  apis::ApiError,
  checkout::{Checkout, PriceCatalog},
  ledger::RedeemedCodes,
  license::LicenseResolver,
  providers::{billing::BillingProvider, identity::IdentityProvider},
};
use chrono::{DateTime, Utc};
use libcommon::{Clock, TokenSigner, TokenVerifier};
use std::{net::SocketAddr, sync::Arc};

/// Key pair and issuer, loaded and cross-checked once at startup
pub struct CryptoState {
  pub signer: TokenSigner,
  /// Same clock the signer reads
  pub clock: Clock,
}

impl CryptoState {
  pub fn new(signer: TokenSigner, clock: Clock) -> Self {
    Self {
      signer: signer.with_clock(clock.clone()),
      clock,
    }
  }
  pub fn now(&self) -> DateTime<Utc> {
    (self.clock)()
  }
  pub fn verifier(&self) -> &TokenVerifier {
    self.signer.verifier()
  }
}

/// External collaborators. Each is optional; endpoints needing a missing one answer `ConfigurationMissing`.
#[derive(Default)]
pub struct ProviderState {
  pub identity: Option<Arc<dyn IdentityProvider>>,
  pub billing: Option<Arc<dyn BillingProvider>>,
  pub webhook_secret: Option<String>,
}

pub struct AppState {
  pub listen_socket: SocketAddr,
  pub site_url: String,
  pub crypto: CryptoState,
  pub providers: ProviderState,
  pub prices: PriceCatalog,
  pub redeemed_codes: RedeemedCodes,
}

impl AppState {
  pub fn identity(&self) -> Result<&dyn IdentityProvider, ApiError> {
    self
      .providers
      .identity
      .as_deref()
      .ok_or(ApiError::ConfigurationMissing("identity provider"))
  }

  pub fn billing(&self) -> Result<&dyn BillingProvider, ApiError> {
    self
      .providers
      .billing
      .as_deref()
      .ok_or(ApiError::ConfigurationMissing("billing provider"))
  }

  pub fn webhook_secret(&self) -> Result<&str, ApiError> {
    self
      .providers
      .webhook_secret
      .as_deref()
      .ok_or(ApiError::ConfigurationMissing("webhook secret"))
  }

  pub fn license_resolver(&self) -> Result<LicenseResolver<'_>, ApiError> {
    Ok(LicenseResolver::new(self.billing()?))
  }

  pub fn checkout(&self) -> Result<Checkout<'_>, ApiError> {
    Ok(Checkout {
      billing: self.billing()?,
      catalog: &self.prices,
      site_url: &self.site_url,
    })
  }
}
