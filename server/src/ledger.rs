use chrono::{DateTime, Utc};
use std::{collections::HashMap, sync::Mutex};

/// Ledger of redeemed desktop exchange codes, keyed by `jti`.
/// Entries only need to outlive the code itself, so expired ones are pruned on every insertion.
/// The exchange records a code after its billing lookups succeed; a failed exchange can be retried.
#[derive(Debug, Default)]
pub struct RedeemedCodes {
  inner: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl RedeemedCodes {
  /// Record a redemption. Returns false if the code was already redeemed.
  pub fn redeem(&self, jti: &str, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let mut map = match self.inner.lock() {
      Ok(map) => map,
      Err(poisoned) => poisoned.into_inner(),
    };
    map.retain(|_, exp| *exp > now);
    if map.contains_key(jti) {
      return false;
    }
    map.insert(jti.to_string(), expires_at);
    true
  }

  #[cfg(test)]
  fn len(&self) -> usize {
    self.inner.lock().map(|m| m.len()).unwrap_or_default()
  }
}
