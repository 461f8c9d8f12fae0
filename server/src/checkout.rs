use crate::{
  constants::{META_PLAN, META_REGION},
  log::*,
  providers::{
    billing::{BillingProvider, CheckoutMode, CheckoutRequest, Customer, Metadata},
    ProviderError,
  },
};
use libcommon::{LicenseSnapshot, Plan, Region};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::OnceCell;

#[derive(Debug, Error)]
pub enum CheckoutError {
  #[error("An active subscription already exists")]
  ActiveSubscriptionExists,
  #[error("An active lifetime license already exists")]
  ActiveLifetimeExists,
  #[error("No price is configured for lookup key {0}")]
  PriceNotFound(String),
  #[error("Checkout session has no url")]
  MissingUrl,
  #[error(transparent)]
  Provider(#[from] ProviderError),
}

/// Price lookup key of a plan in a region, e.g. `pro_br`
pub fn lookup_key(plan: Plan, region: Region) -> String {
  format!("{}_{}", plan.as_str(), region.as_str())
}

fn all_lookup_keys() -> Vec<String> {
  [Plan::Pro, Plan::Lifetime]
    .iter()
    .flat_map(|plan| [Region::Global, Region::Br].map(|region| lookup_key(*plan, region)))
    .collect()
}

/// Price ids by lookup key, resolved once per process.
/// A failed resolution leaves the cell empty so the next request retries.
#[derive(Debug, Default)]
pub struct PriceCatalog {
  prices: OnceCell<HashMap<String, String>>,
}

impl PriceCatalog {
  pub async fn price_id(&self, billing: &dyn BillingProvider, plan: Plan, region: Region) -> Result<String, CheckoutError> {
    let prices = self
      .prices
      .get_or_try_init(|| async {
        let found = billing.find_prices(&all_lookup_keys()).await?;
        info!("Resolved {} prices from the billing provider", found.len());
        Ok::<_, ProviderError>(
          found
            .into_iter()
            .filter_map(|p| Some((p.lookup_key?, p.id)))
            .collect::<HashMap<_, _>>(),
        )
      })
      .await?;
    let key = lookup_key(plan, region);
    prices.get(&key).cloned().ok_or(CheckoutError::PriceNotFound(key))
  }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
/// Price shown on the site. Never charged by this server.
pub struct DisplayPrice {
  pub amount: u32,
  pub currency: &'static str,
  /// `month` for subscriptions, `null` for one-time payments
  pub interval: Option<&'static str>,
}

pub fn display_price(plan: Plan, region: Region) -> DisplayPrice {
  let (amount, currency) = match (plan, region) {
    (Plan::Pro, Region::Global) => (10, "USD"),
    (Plan::Pro, Region::Br) => (27, "BRL"),
    (Plan::Lifetime, Region::Global) => (87, "USD"),
    (Plan::Lifetime, Region::Br) => (177, "BRL"),
  };
  DisplayPrice {
    amount,
    currency,
    interval: (plan == Plan::Pro).then_some("month"),
  }
}

/// Reject purchases the customer already holds. Upgrading an active pro subscription to lifetime is allowed.
pub fn check_conflict(plan: Plan, license: &LicenseSnapshot) -> Result<(), CheckoutError> {
  if license.is_active_lifetime() {
    return Err(CheckoutError::ActiveLifetimeExists);
  }
  if plan == Plan::Pro && license.active && license.plan == Some(Plan::Pro) {
    return Err(CheckoutError::ActiveSubscriptionExists);
  }
  Ok(())
}

/// Everything needed to open a checkout session for one customer
pub struct Checkout<'a> {
  pub billing: &'a dyn BillingProvider,
  pub catalog: &'a PriceCatalog,
  pub site_url: &'a str,
}

impl Checkout<'_> {
  /// Create a checkout session and return its url
  pub async fn create(
    &self,
    customer: &Customer,
    license: &LicenseSnapshot,
    plan: Plan,
    region: Region,
  ) -> Result<String, CheckoutError> {
    check_conflict(plan, license)?;
    let price_id = self.catalog.price_id(self.billing, plan, region).await?;

    let mut metadata = Metadata::new();
    metadata.insert(META_PLAN.to_string(), plan.to_string());
    metadata.insert(META_REGION.to_string(), region.to_string());
    let site = self.site_url.trim_end_matches('/');
    let request = CheckoutRequest {
      customer_id: customer.id.clone(),
      price_id,
      mode: match plan {
        Plan::Pro => CheckoutMode::Subscription,
        Plan::Lifetime => CheckoutMode::Payment,
      },
      success_url: format!("{site}/account/?checkout=success&session_id={{CHECKOUT_SESSION_ID}}"),
      cancel_url: format!("{site}/#pricing"),
      metadata,
    };
    let session = self.billing.create_checkout_session(&request).await?;
    info!("[{}] Opened {} checkout session {}", customer.id, plan, session.id);
    session.url.ok_or(CheckoutError::MissingUrl)
  }
}
