use crate::constants::LIFETIME_VALIDITY_MONTHS;
use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Paid plan
pub enum Plan {
  /// Monthly subscription
  Pro,
  /// One-time payment
  Lifetime,
}
impl Plan {
  pub fn as_str(&self) -> &'static str {
    match self {
      Plan::Pro => "pro",
      Plan::Lifetime => "lifetime",
    }
  }
}
impl fmt::Display for Plan {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
impl FromStr for Plan {
  type Err = anyhow::Error;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "pro" => Ok(Plan::Pro),
      "lifetime" => Ok(Plan::Lifetime),
      other => anyhow::bail!("Unknown plan: {other}"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
/// Pricing region
pub enum Region {
  #[default]
  Global,
  Br,
}
impl Region {
  pub fn as_str(&self) -> &'static str {
    match self {
      Region::Global => "global",
      Region::Br => "br",
    }
  }
  /// `pt-BR` maps to the Brazilian region, everything else is global
  pub fn from_locale(locale: Option<&str>) -> Self {
    match locale {
      Some(l) if l.eq_ignore_ascii_case("pt-br") => Region::Br,
      _ => Region::Global,
    }
  }
}
impl fmt::Display for Region {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
impl FromStr for Region {
  type Err = anyhow::Error;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "global" => Ok(Region::Global),
      "br" => Ok(Region::Br),
      other => anyhow::bail!("Unknown region: {other}"),
    }
  }
}

/// Validity of a lifetime plan activated at `activated_at`
pub fn lifetime_valid_until(activated_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
  activated_at.checked_add_months(Months::new(LIFETIME_VALIDITY_MONTHS))
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "LicenseSnapshotWire", from = "LicenseSnapshotWire")]
/// Canonical entitlement state of one customer at resolution time.
/// `watermarkRequired` is not stored; it is always written as `!active`.
pub struct LicenseSnapshot {
  pub active: bool,
  pub plan: Option<Plan>,
  pub region: Option<Region>,
  pub activated_at: Option<DateTime<Utc>>,
  pub subscription_status: Option<String>,
  pub license_valid_until: Option<DateTime<Utc>>,
  pub paid_amount: Option<i64>,
  pub paid_currency: Option<String>,
}

impl LicenseSnapshot {
  /// Snapshot for someone the billing provider knows nothing about
  pub fn inactive() -> Self {
    Self::default()
  }
  pub fn watermark_required(&self) -> bool {
    !self.active
  }
  pub fn is_active_lifetime(&self) -> bool {
    self.active && self.plan == Some(Plan::Lifetime)
  }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LicenseSnapshotWire {
  active: bool,
  plan: Option<Plan>,
  region: Option<Region>,
  activated_at: Option<DateTime<Utc>>,
  subscription_status: Option<String>,
  license_valid_until: Option<DateTime<Utc>>,
  paid_amount: Option<i64>,
  paid_currency: Option<String>,
  #[serde(default)]
  watermark_required: bool,
}

impl From<LicenseSnapshot> for LicenseSnapshotWire {
  fn from(s: LicenseSnapshot) -> Self {
    Self {
      watermark_required: !s.active,
      active: s.active,
      plan: s.plan,
      region: s.region,
      activated_at: s.activated_at,
      subscription_status: s.subscription_status,
      license_valid_until: s.license_valid_until,
      paid_amount: s.paid_amount,
      paid_currency: s.paid_currency,
    }
  }
}
impl From<LicenseSnapshotWire> for LicenseSnapshot {
  fn from(w: LicenseSnapshotWire) -> Self {
    Self {
      active: w.active,
      plan: w.plan,
      region: w.region,
      activated_at: w.activated_at,
      subscription_status: w.subscription_status,
      license_valid_until: w.license_valid_until,
      paid_amount: w.paid_amount,
      paid_currency: w.paid_currency,
    }
  }
}
