mod stripe;

use super::ProviderResult;
use crate::constants::ACTIVE_LIKE_STATUSES;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub use stripe::StripeClient;

/// Provider-side key-value store attached to customers and checkout sessions
pub type Metadata = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Customer {
  pub id: String,
  pub email: Option<String>,
  pub name: Option<String>,
  pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
  pub id: String,
  pub customer: Option<String>,
  pub status: String,
  pub current_period_end: Option<DateTime<Utc>>,
  pub created: DateTime<Utc>,
  pub cancel_at_period_end: bool,
  pub cancel_at: Option<DateTime<Utc>>,
}

impl Subscription {
  pub fn is_active_like(&self) -> bool {
    is_active_like(&self.status)
  }
}

pub fn is_active_like(status: &str) -> bool {
  ACTIVE_LIKE_STATUSES.contains(&status)
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CheckoutSession {
  pub id: String,
  pub customer: Option<String>,
  pub mode: Option<String>,
  pub status: Option<String>,
  pub payment_status: Option<String>,
  pub subscription: Option<String>,
  pub created: DateTime<Utc>,
  pub amount_total: Option<i64>,
  pub currency: Option<String>,
  pub metadata: Metadata,
  pub url: Option<String>,
}

impl CheckoutSession {
  pub fn is_complete(&self) -> bool {
    self.status.as_deref() == Some("complete")
  }
  pub fn is_paid(&self) -> bool {
    self.payment_status.as_deref() == Some("paid")
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
  pub id: String,
  pub created: DateTime<Utc>,
  pub amount_paid: i64,
  pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Price {
  pub id: String,
  pub lookup_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutMode {
  Subscription,
  Payment,
}

impl CheckoutMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      CheckoutMode::Subscription => "subscription",
      CheckoutMode::Payment => "payment",
    }
  }
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
  pub customer_id: String,
  pub price_id: String,
  pub mode: CheckoutMode,
  pub success_url: String,
  pub cancel_url: String,
  pub metadata: Metadata,
}

#[async_trait]
/// Billing provider operations the license resolver, checkout and webhook rely on
pub trait BillingProvider: Send + Sync {
  async fn find_customer_by_email(&self, email: &str) -> ProviderResult<Option<Customer>>;
  async fn get_customer(&self, customer_id: &str) -> ProviderResult<Customer>;
  async fn create_customer(&self, email: &str, name: Option<&str>, metadata: &Metadata) -> ProviderResult<Customer>;
  /// Merge `metadata` into the customer's metadata, optionally replacing the display name
  async fn update_customer(&self, customer_id: &str, name: Option<&str>, metadata: &Metadata) -> ProviderResult<Customer>;

  async fn get_subscription(&self, subscription_id: &str) -> ProviderResult<Subscription>;
  /// Subscriptions of the customer in every status, newest first
  async fn list_subscriptions(&self, customer_id: &str) -> ProviderResult<Vec<Subscription>>;
  async fn cancel_subscription_at_period_end(&self, subscription_id: &str) -> ProviderResult<Subscription>;

  async fn list_checkout_sessions(&self, customer_id: &str) -> ProviderResult<Vec<CheckoutSession>>;
  async fn create_checkout_session(&self, request: &CheckoutRequest) -> ProviderResult<CheckoutSession>;

  async fn list_paid_invoices(&self, customer_id: &str) -> ProviderResult<Vec<Invoice>>;

  /// Active prices carrying any of the given lookup keys
  async fn find_prices(&self, lookup_keys: &[String]) -> ProviderResult<Vec<Price>>;
}
