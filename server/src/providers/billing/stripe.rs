use super::*;
use crate::{
  constants::{STRIPE_API_BASE, STRIPE_LIST_LIMIT},
  log::*,
  providers::ProviderError,
};
use serde::{de::DeserializeOwned, Deserialize};

/// Stripe REST client. Requests are form-encoded and authenticated with the secret key.
pub struct StripeClient {
  http: reqwest::Client,
  secret_key: String,
  api_base: String,
}

impl StripeClient {
  pub fn new(http: reqwest::Client, secret_key: &str) -> Self {
    Self {
      http,
      secret_key: secret_key.to_string(),
      api_base: STRIPE_API_BASE.to_string(),
    }
  }

  fn url(&self, path: &str) -> String {
    format!("{}/{}", self.api_base, path.trim_start_matches('/'))
  }

  async fn get<R: DeserializeOwned>(&self, path: &str, query: &[(String, String)]) -> ProviderResult<R> {
    let res = self
      .http
      .get(self.url(path))
      .bearer_auth(&self.secret_key)
      .query(query)
      .send()
      .await?;
    Self::read(res).await
  }

  async fn post<R: DeserializeOwned>(&self, path: &str, form: &[(String, String)]) -> ProviderResult<R> {
    let res = self
      .http
      .post(self.url(path))
      .bearer_auth(&self.secret_key)
      .form(form)
      .send()
      .await?;
    Self::read(res).await
  }

  async fn read<R: DeserializeOwned>(res: reqwest::Response) -> ProviderResult<R> {
    let status = res.status();
    if status.is_success() {
      return Ok(res.json::<R>().await?);
    }
    let message = match res.json::<ErrorEnvelope>().await {
      Ok(e) => e.error.message.unwrap_or_default(),
      Err(_) => String::new(),
    };
    debug!("Stripe answered {status}: {message}");
    Err(ProviderError::Rejected {
      status: status.as_u16(),
      message,
    })
  }
}

/// Stripe encodes nested parameters as `metadata[key]=value`
fn metadata_params(metadata: &Metadata) -> Vec<(String, String)> {
  metadata
    .iter()
    .map(|(k, v)| (format!("metadata[{k}]"), v.clone()))
    .collect()
}

fn limit() -> (String, String) {
  ("limit".to_string(), STRIPE_LIST_LIMIT.to_string())
}

fn timestamp(secs: i64) -> DateTime<Utc> {
  DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/* -------------------------------- */
// Wire types

#[derive(Deserialize)]
struct ErrorEnvelope {
  error: ErrorBody,
}
#[derive(Deserialize)]
struct ErrorBody {
  message: Option<String>,
}

#[derive(Deserialize)]
struct List<T> {
  data: Vec<T>,
}

#[derive(Deserialize)]
struct CustomerWire {
  id: String,
  email: Option<String>,
  name: Option<String>,
  #[serde(default)]
  metadata: Metadata,
}
impl From<CustomerWire> for Customer {
  fn from(w: CustomerWire) -> Self {
    Customer {
      id: w.id,
      email: w.email,
      name: w.name,
      metadata: w.metadata,
    }
  }
}

#[derive(Deserialize)]
struct SubscriptionItemWire {
  current_period_end: Option<i64>,
}

#[derive(Deserialize)]
struct SubscriptionWire {
  id: String,
  customer: Option<String>,
  status: String,
  current_period_end: Option<i64>,
  created: i64,
  #[serde(default)]
  cancel_at_period_end: bool,
  cancel_at: Option<i64>,
  items: Option<List<SubscriptionItemWire>>,
}
impl From<SubscriptionWire> for Subscription {
  fn from(w: SubscriptionWire) -> Self {
    // newer API versions only carry the period on subscription items
    let current_period_end = w.current_period_end.or_else(|| {
      w.items
        .as_ref()
        .and_then(|items| items.data.iter().filter_map(|i| i.current_period_end).max())
    });
    Subscription {
      id: w.id,
      customer: w.customer,
      status: w.status,
      current_period_end: current_period_end.map(timestamp),
      created: timestamp(w.created),
      cancel_at_period_end: w.cancel_at_period_end,
      cancel_at: w.cancel_at.map(timestamp),
    }
  }
}

#[derive(Deserialize)]
struct CheckoutSessionWire {
  id: String,
  customer: Option<String>,
  mode: Option<String>,
  status: Option<String>,
  payment_status: Option<String>,
  subscription: Option<String>,
  created: i64,
  amount_total: Option<i64>,
  currency: Option<String>,
  #[serde(default)]
  metadata: Option<Metadata>,
  url: Option<String>,
}
impl From<CheckoutSessionWire> for CheckoutSession {
  fn from(w: CheckoutSessionWire) -> Self {
    CheckoutSession {
      id: w.id,
      customer: w.customer,
      mode: w.mode,
      status: w.status,
      payment_status: w.payment_status,
      subscription: w.subscription,
      created: timestamp(w.created),
      amount_total: w.amount_total,
      currency: w.currency,
      metadata: w.metadata.unwrap_or_default(),
      url: w.url,
    }
  }
}

#[derive(Deserialize)]
struct InvoiceWire {
  id: String,
  created: i64,
  amount_paid: i64,
  currency: String,
}

#[derive(Deserialize)]
struct PriceWire {
  id: String,
  lookup_key: Option<String>,
}

/* -------------------------------- */

#[async_trait]
impl BillingProvider for StripeClient {
  async fn find_customer_by_email(&self, email: &str) -> ProviderResult<Option<Customer>> {
    let query = [("email".to_string(), email.to_string()), ("limit".to_string(), "1".to_string())];
    let list: List<CustomerWire> = self.get("customers", &query).await?;
    Ok(list.data.into_iter().next().map(Customer::from))
  }

  async fn get_customer(&self, customer_id: &str) -> ProviderResult<Customer> {
    let wire: CustomerWire = self.get(&format!("customers/{customer_id}"), &[]).await?;
    Ok(wire.into())
  }

  async fn create_customer(&self, email: &str, name: Option<&str>, metadata: &Metadata) -> ProviderResult<Customer> {
    let mut form = vec![("email".to_string(), email.to_string())];
    if let Some(name) = name {
      form.push(("name".to_string(), name.to_string()));
    }
    form.extend(metadata_params(metadata));
    let wire: CustomerWire = self.post("customers", &form).await?;
    info!("Created billing customer {}", wire.id);
    Ok(wire.into())
  }

  async fn update_customer(&self, customer_id: &str, name: Option<&str>, metadata: &Metadata) -> ProviderResult<Customer> {
    let mut form = metadata_params(metadata);
    if let Some(name) = name {
      form.push(("name".to_string(), name.to_string()));
    }
    let wire: CustomerWire = self.post(&format!("customers/{customer_id}"), &form).await?;
    Ok(wire.into())
  }

  async fn get_subscription(&self, subscription_id: &str) -> ProviderResult<Subscription> {
    let wire: SubscriptionWire = self.get(&format!("subscriptions/{subscription_id}"), &[]).await?;
    Ok(wire.into())
  }

  async fn list_subscriptions(&self, customer_id: &str) -> ProviderResult<Vec<Subscription>> {
    let query = [
      ("customer".to_string(), customer_id.to_string()),
      ("status".to_string(), "all".to_string()),
      limit(),
    ];
    let list: List<SubscriptionWire> = self.get("subscriptions", &query).await?;
    Ok(list.data.into_iter().map(Subscription::from).collect())
  }

  async fn cancel_subscription_at_period_end(&self, subscription_id: &str) -> ProviderResult<Subscription> {
    let form = [("cancel_at_period_end".to_string(), "true".to_string())];
    let wire: SubscriptionWire = self.post(&format!("subscriptions/{subscription_id}"), &form).await?;
    Ok(wire.into())
  }

  async fn list_checkout_sessions(&self, customer_id: &str) -> ProviderResult<Vec<CheckoutSession>> {
    let query = [("customer".to_string(), customer_id.to_string()), limit()];
    let list: List<CheckoutSessionWire> = self.get("checkout/sessions", &query).await?;
    Ok(list.data.into_iter().map(CheckoutSession::from).collect())
  }

  async fn create_checkout_session(&self, request: &CheckoutRequest) -> ProviderResult<CheckoutSession> {
    let mut form = vec![
      ("customer".to_string(), request.customer_id.clone()),
      ("mode".to_string(), request.mode.as_str().to_string()),
      ("line_items[0][price]".to_string(), request.price_id.clone()),
      ("line_items[0][quantity]".to_string(), "1".to_string()),
      ("success_url".to_string(), request.success_url.clone()),
      ("cancel_url".to_string(), request.cancel_url.clone()),
    ];
    form.extend(metadata_params(&request.metadata));
    if request.mode == CheckoutMode::Subscription {
      // lets subscription events carry the plan and region as well
      form.extend(
        request
          .metadata
          .iter()
          .map(|(k, v)| (format!("subscription_data[metadata][{k}]"), v.clone())),
      );
    }
    let wire: CheckoutSessionWire = self.post("checkout/sessions", &form).await?;
    Ok(wire.into())
  }

  async fn list_paid_invoices(&self, customer_id: &str) -> ProviderResult<Vec<Invoice>> {
    let query = [
      ("customer".to_string(), customer_id.to_string()),
      ("status".to_string(), "paid".to_string()),
      limit(),
    ];
    let list: List<InvoiceWire> = self.get("invoices", &query).await?;
    Ok(
      list
        .data
        .into_iter()
        .map(|w| Invoice {
          id: w.id,
          created: timestamp(w.created),
          amount_paid: w.amount_paid,
          currency: w.currency,
        })
        .collect(),
    )
  }

  async fn find_prices(&self, lookup_keys: &[String]) -> ProviderResult<Vec<Price>> {
    let mut query = vec![("active".to_string(), "true".to_string())];
    query.extend(lookup_keys.iter().map(|k| ("lookup_keys[]".to_string(), k.clone())));
    let list: List<PriceWire> = self.get("prices", &query).await?;
    Ok(
      list
        .data
        .into_iter()
        .map(|w| Price {
          id: w.id,
          lookup_key: w.lookup_key,
        })
        .collect(),
    )
  }
}
