//! License resolution: turns a billing customer into one canonical [`LicenseSnapshot`].
//!
//! [`reconcile`] is a pure function of the customer record and the live signals gathered from the provider.
//! [`LicenseResolver`] gathers those signals, swallows their failures and writes the reconciled
//! fields back to customer metadata on a best-effort basis.

use crate::{
  constants::*,
  log::*,
  providers::{
    billing::{BillingProvider, CheckoutSession, Customer, Invoice, Metadata, Subscription},
    ProviderResult,
  },
};
use chrono::{DateTime, Months, Utc};
use libcommon::{
  lifetime_valid_until, token_fields::Field, Identity, LicenseSnapshot, Plan, Region, LIFETIME_VALIDITY_MONTHS,
};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Live state of the subscription named in the customer metadata
pub enum NamedSubscription {
  Live(Subscription),
  /// The lookup failed. Treated as canceled.
  Unreachable,
}

#[derive(Debug, Clone, Default)]
/// Live provider signals. Lists whose lookup failed are simply empty.
pub struct LicenseSignals {
  pub named_subscription: Option<NamedSubscription>,
  pub subscriptions: Vec<Subscription>,
  pub checkout_sessions: Vec<CheckoutSession>,
  pub paid_invoices: Vec<Invoice>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
  pub snapshot: LicenseSnapshot,
  /// Metadata fields found stale, to be written back to the customer
  pub write_back: Option<Metadata>,
}

/// Active-like subscription with the latest period end; ties broken by creation time, then id
pub fn pick_active_subscription(subscriptions: &[Subscription]) -> Option<&Subscription> {
  subscriptions
    .iter()
    .filter(|s| s.is_active_like())
    .max_by(|a, b| {
      (a.current_period_end, a.created, &a.id).cmp(&(b.current_period_end, b.created, &b.id))
    })
}

/// Most recent complete and paid checkout session tagged as a lifetime purchase
pub fn pick_lifetime_session(sessions: &[CheckoutSession]) -> Option<&CheckoutSession> {
  sessions
    .iter()
    .filter(|s| s.is_complete() && s.is_paid() && s.metadata.get(META_PLAN).map(String::as_str) == Some(Plan::Lifetime.as_str()))
    .max_by(|a, b| (a.created, &a.id).cmp(&(b.created, &b.id)))
}

/// Latest payment, from paid invoices first and completed checkout sessions otherwise
pub fn latest_payment(invoices: &[Invoice], sessions: &[CheckoutSession]) -> Option<(i64, String)> {
  if let Some(invoice) = invoices.iter().max_by(|a, b| (a.created, &a.id).cmp(&(b.created, &b.id))) {
    return Some((invoice.amount_paid, invoice.currency.clone()));
  }
  sessions
    .iter()
    .filter(|s| s.is_complete() && s.amount_total.is_some())
    .max_by(|a, b| (a.created, &a.id).cmp(&(b.created, &b.id)))
    .and_then(|s| Some((s.amount_total?, s.currency.clone()?)))
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
  if let Ok(t) = DateTime::parse_from_rfc3339(s) {
    return Some(t.with_timezone(&Utc));
  }
  s.parse::<i64>().ok().and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn lifetime_from_now(now: DateTime<Utc>) -> Option<DateTime<Utc>> {
  now.checked_add_months(Months::new(LIFETIME_VALIDITY_MONTHS))
}

/// Reconcile cached metadata with live provider signals
pub fn reconcile(customer: &Customer, signals: &LicenseSignals, now: DateTime<Utc>) -> Reconciled {
  let meta = &customer.metadata;
  let mut patch = Metadata::new();

  // seed from the metadata cache
  let cached_active = meta.get(META_ACTIVE).map(String::as_str) == Some("true");
  let mut active = cached_active;
  let mut plan = meta.get(META_PLAN).and_then(|p| p.parse::<Plan>().ok());
  let mut region = meta.get(META_REGION).and_then(|r| r.parse::<Region>().ok());
  let mut activated_at = meta.get(META_ACTIVATED_AT).and_then(|t| parse_timestamp(t));
  let mut subscription_status = meta.get(META_SUBSCRIPTION_STATUS).cloned();
  let mut valid_until = None;
  let lifetime_holder = cached_active && plan == Some(Plan::Lifetime);

  // subscription named in metadata
  let mut has_active_subscription = false;
  match &signals.named_subscription {
    Some(NamedSubscription::Live(sub)) => {
      subscription_status = Some(sub.status.clone());
      if sub.is_active_like() && !lifetime_holder {
        has_active_subscription = true;
        active = true;
        plan = Some(Plan::Pro);
        valid_until = sub.current_period_end;
      }
    }
    Some(NamedSubscription::Unreachable) => subscription_status = Some("canceled".to_string()),
    None => (),
  }

  // live subscription list covers metadata drift
  if let Some(sub) = pick_active_subscription(&signals.subscriptions) {
    if lifetime_holder {
      debug!("[{}] Ignoring subscription {} of a lifetime holder", customer.id, sub.id);
    } else if !has_active_subscription {
      has_active_subscription = true;
      active = true;
      plan = Some(Plan::Pro);
      subscription_status = Some(sub.status.clone());
      valid_until = sub.current_period_end;
      patch.insert(META_ACTIVE.to_string(), "true".to_string());
      patch.insert(META_PLAN.to_string(), Plan::Pro.to_string());
      patch.insert(META_SUBSCRIPTION_ID.to_string(), sub.id.clone());
      patch.insert(META_SUBSCRIPTION_STATUS.to_string(), sub.status.clone());
    }
  }

  if plan == Some(Plan::Lifetime) {
    valid_until = activated_at.and_then(lifetime_valid_until).or_else(|| lifetime_from_now(now));
  }

  // paid lifetime purchase not yet reflected in metadata
  if !has_active_subscription && !lifetime_holder {
    if let Some(session) = pick_lifetime_session(&signals.checkout_sessions) {
      active = true;
      plan = Some(Plan::Lifetime);
      if let Some(r) = session.metadata.get(META_REGION).and_then(|r| r.parse::<Region>().ok()) {
        region = Some(r);
      }
      activated_at = Some(session.created);
      valid_until = lifetime_valid_until(session.created);
      patch.insert(META_ACTIVE.to_string(), "true".to_string());
      patch.insert(META_PLAN.to_string(), Plan::Lifetime.to_string());
      patch.insert(META_REGION.to_string(), region.unwrap_or_default().to_string());
      patch.insert(META_ACTIVATED_AT.to_string(), session.created.to_rfc3339());
    }
  }

  // stale pro flag after a cancellation
  if plan == Some(Plan::Pro) && !has_active_subscription {
    active = false;
    valid_until = None;
    if subscription_status.is_none() {
      subscription_status = Some("canceled".to_string());
    }
    if cached_active {
      patch.insert(META_ACTIVE.to_string(), "false".to_string());
      patch.insert(
        META_SUBSCRIPTION_STATUS.to_string(),
        subscription_status.clone().unwrap_or_default(),
      );
    }
  }

  if plan == Some(Plan::Lifetime) && valid_until.is_none() {
    valid_until = lifetime_from_now(now);
  }

  // nothing outlives its validity
  if !valid_until.is_some_and(|v| v > now) {
    active = false;
  }
  if let Some(cached) = patch.get_mut(META_ACTIVE) {
    *cached = active.to_string();
  }

  let (paid_amount, paid_currency) = match latest_payment(&signals.paid_invoices, &signals.checkout_sessions) {
    Some((amount, currency)) => (Some(amount), Some(currency)),
    None => (None, None),
  };

  Reconciled {
    snapshot: LicenseSnapshot {
      active,
      plan,
      region,
      activated_at,
      subscription_status,
      license_valid_until: valid_until,
      paid_amount,
      paid_currency,
    },
    write_back: (!patch.is_empty()).then_some(patch),
  }
}

/* -------------------------------- */
/// Drives [`reconcile`] against a billing provider
pub struct LicenseResolver<'a> {
  billing: &'a dyn BillingProvider,
}

impl<'a> LicenseResolver<'a> {
  pub fn new(billing: &'a dyn BillingProvider) -> Self {
    Self { billing }
  }

  /// Gather every live signal concurrently. Failed lookups count as absent signals.
  pub async fn gather(&self, customer: &Customer) -> LicenseSignals {
    let named = async {
      let id = customer.metadata.get(META_SUBSCRIPTION_ID)?;
      Some(match self.billing.get_subscription(id).await {
        Ok(sub) => NamedSubscription::Live(sub),
        Err(e) => {
          warn!("[{}] Failed to fetch subscription {id}: {e}", customer.id);
          NamedSubscription::Unreachable
        }
      })
    };
    let (named_subscription, subscriptions, checkout_sessions, paid_invoices) = tokio::join!(
      named,
      self.billing.list_subscriptions(&customer.id),
      self.billing.list_checkout_sessions(&customer.id),
      self.billing.list_paid_invoices(&customer.id),
    );
    LicenseSignals {
      named_subscription,
      subscriptions: or_absent(subscriptions, "subscriptions", &customer.id),
      checkout_sessions: or_absent(checkout_sessions, "checkout sessions", &customer.id),
      paid_invoices: or_absent(paid_invoices, "paid invoices", &customer.id),
    }
  }

  /// Resolve the license of a customer. Always produces a snapshot.
  pub async fn resolve(&self, customer: &Customer, now: DateTime<Utc>) -> LicenseSnapshot {
    let signals = self.gather(customer).await;
    let Reconciled { snapshot, write_back } = reconcile(customer, &signals, now);
    if let Some(patch) = write_back {
      debug!("[{}] Writing back reconciled metadata: {:?}", customer.id, patch);
      if let Err(e) = self.billing.update_customer(&customer.id, None, &patch).await {
        warn!("[{}] Failed to write back license metadata: {e}", customer.id);
      }
    }
    snapshot
  }

  /// Resolve by email without creating a customer. Unknown emails hold no license.
  pub async fn resolve_by_email(&self, email: &str, now: DateTime<Utc>) -> ProviderResult<LicenseSnapshot> {
    match self.billing.find_customer_by_email(email).await? {
      Some(customer) => Ok(self.resolve(&customer, now).await),
      None => Ok(LicenseSnapshot::inactive()),
    }
  }

  /// Find the customer keyed by the identity's email, or create it. Display name and avatar are kept current.
  pub async fn find_or_create_customer(&self, identity: &Identity) -> ProviderResult<Customer> {
    let email = identity.email.as_str();
    let Some(customer) = self.billing.find_customer_by_email(email).await? else {
      let mut metadata = Metadata::new();
      if let Some(picture) = &identity.picture {
        metadata.insert(META_PICTURE.to_string(), picture.clone());
      }
      return self.billing.create_customer(email, identity.name.as_deref(), &metadata).await;
    };

    let name = identity.name.as_deref().filter(|n| customer.name.as_deref() != Some(*n));
    let mut metadata = Metadata::new();
    if let Some(picture) = &identity.picture {
      if customer.metadata.get(META_PICTURE) != Some(picture) {
        metadata.insert(META_PICTURE.to_string(), picture.clone());
      }
    }
    if name.is_none() && metadata.is_empty() {
      return Ok(customer);
    }
    match self.billing.update_customer(&customer.id, name, &metadata).await {
      Ok(updated) => Ok(updated),
      Err(e) => {
        warn!("[{}] Failed to update customer profile: {e}", customer.id);
        Ok(customer)
      }
    }
  }
}

fn or_absent<T>(res: ProviderResult<Vec<T>>, what: &str, customer_id: &str) -> Vec<T> {
  res.unwrap_or_else(|e| {
    warn!("[{customer_id}] Failed to list {what}: {e}");
    Vec::new()
  })
}
