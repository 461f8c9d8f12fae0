//! Billing provider push events, kept as a passive sink warming the customer metadata cache.

use crate::{
  constants::*,
  log::*,
  providers::{
    billing::{is_active_like, BillingProvider, Metadata},
    ProviderResult,
  },
};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use libcommon::Plan;
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
  #[error("Malformed signature header")]
  MalformedHeader,
  #[error("Signature timestamp is out of tolerance")]
  OutOfTolerance,
  #[error("No signature matched")]
  Mismatch,
}

/// Verify a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=<hex>...]`) over the raw payload
pub fn verify_signature(header: &str, payload: &[u8], secret: &str, now: DateTime<Utc>) -> Result<(), SignatureError> {
  let mut timestamp = None;
  let mut signatures = Vec::new();
  for part in header.split(',') {
    match part.trim().split_once('=') {
      Some(("t", t)) => timestamp = Some(t),
      Some(("v1", sig)) => signatures.push(sig),
      _ => (),
    }
  }
  let Some(t) = timestamp else {
    return Err(SignatureError::MalformedHeader);
  };
  let signed_at: i64 = t.parse().map_err(|_| SignatureError::MalformedHeader)?;
  if (now.timestamp() - signed_at).abs() > WEBHOOK_TOLERANCE_SECS {
    return Err(SignatureError::OutOfTolerance);
  }

  let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Mismatch)?;
  mac.update(t.as_bytes());
  mac.update(b".");
  mac.update(payload);
  let matched = signatures
    .iter()
    .filter_map(|sig| hex::decode(sig).ok())
    .any(|sig| mac.clone().verify_slice(&sig).is_ok());
  if matched {
    Ok(())
  } else {
    Err(SignatureError::Mismatch)
  }
}

#[derive(Debug, Deserialize)]
pub struct Event {
  pub id: String,
  #[serde(rename = "type")]
  pub kind: String,
  pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
  pub object: serde_json::Value,
}

#[derive(Deserialize)]
struct SessionObject {
  customer: Option<String>,
  mode: Option<String>,
  subscription: Option<String>,
  created: i64,
  #[serde(default)]
  metadata: Option<Metadata>,
}

#[derive(Deserialize)]
struct SubscriptionObject {
  id: String,
  customer: String,
  status: String,
}

#[derive(Deserialize)]
struct InvoiceObject {
  customer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Metadata update derived from one event
pub struct MetadataPatch {
  pub customer_id: String,
  pub metadata: Metadata,
  /// Leave confirmed lifetime holders untouched
  pub skip_lifetime_holders: bool,
}

fn pairs(items: &[(&str, String)]) -> Metadata {
  items.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

/// Map an event to the metadata patch it implies. Unknown or unusable events yield `None`.
pub fn patch_for_event(event: &Event, now: DateTime<Utc>) -> Option<MetadataPatch> {
  let object = event.data.object.clone();
  match event.kind.as_str() {
    "checkout.session.completed" => {
      let session: SessionObject = serde_json::from_value(object).ok()?;
      let customer_id = session.customer?;
      let metadata = session.metadata.unwrap_or_default();
      let region = metadata.get(META_REGION).cloned().unwrap_or_else(|| "global".to_string());
      let patch = if metadata.get(META_PLAN).map(String::as_str) == Some(Plan::Lifetime.as_str()) {
        let created = DateTime::from_timestamp(session.created, 0).unwrap_or(now);
        pairs(&[
          (META_ACTIVE, "true".to_string()),
          (META_PLAN, Plan::Lifetime.to_string()),
          (META_REGION, region),
          (META_ACTIVATED_AT, created.to_rfc3339()),
        ])
      } else if session.mode.as_deref() == Some("subscription") {
        let mut patch = pairs(&[
          (META_ACTIVE, "true".to_string()),
          (META_PLAN, Plan::Pro.to_string()),
          (META_REGION, region),
        ]);
        if let Some(sub) = session.subscription {
          patch.insert(META_SUBSCRIPTION_ID.to_string(), sub);
        }
        patch
      } else {
        return None;
      };
      Some(MetadataPatch {
        customer_id,
        metadata: patch,
        skip_lifetime_holders: false,
      })
    }
    "customer.subscription.updated" => {
      let sub: SubscriptionObject = serde_json::from_value(object).ok()?;
      let metadata = if is_active_like(&sub.status) {
        pairs(&[
          (META_ACTIVE, "true".to_string()),
          (META_PLAN, Plan::Pro.to_string()),
          (META_SUBSCRIPTION_ID, sub.id),
          (META_SUBSCRIPTION_STATUS, sub.status),
        ])
      } else {
        pairs(&[(META_ACTIVE, "false".to_string()), (META_SUBSCRIPTION_STATUS, sub.status)])
      };
      Some(MetadataPatch {
        customer_id: sub.customer,
        metadata,
        skip_lifetime_holders: true,
      })
    }
    "customer.subscription.deleted" => {
      let sub: SubscriptionObject = serde_json::from_value(object).ok()?;
      Some(MetadataPatch {
        customer_id: sub.customer,
        metadata: pairs(&[
          (META_ACTIVE, "false".to_string()),
          (META_SUBSCRIPTION_STATUS, "canceled".to_string()),
        ]),
        skip_lifetime_holders: true,
      })
    }
    "invoice.payment_failed" => {
      let invoice: InvoiceObject = serde_json::from_value(object).ok()?;
      Some(MetadataPatch {
        customer_id: invoice.customer?,
        metadata: pairs(&[
          (META_LAST_PAYMENT_FAILED_AT, now.to_rfc3339()),
          (META_SUBSCRIPTION_STATUS, "past_due".to_string()),
        ]),
        skip_lifetime_holders: false,
      })
    }
    _ => None,
  }
}

/// Write a patch to the customer. Returns false when it was skipped.
pub async fn apply_patch(billing: &dyn BillingProvider, patch: &MetadataPatch) -> ProviderResult<bool> {
  if patch.skip_lifetime_holders {
    let customer = billing.get_customer(&patch.customer_id).await?;
    let meta = &customer.metadata;
    if meta.get(META_ACTIVE).map(String::as_str) == Some("true")
      && meta.get(META_PLAN).map(String::as_str) == Some(Plan::Lifetime.as_str())
    {
      debug!("[{}] Lifetime holder, ignoring subscription event", customer.id);
      return Ok(false);
    }
  }
  billing.update_customer(&patch.customer_id, None, &patch.metadata).await?;
  Ok(true)
}
