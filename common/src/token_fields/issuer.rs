use super::{Field, TryNewField};
use anyhow::Result;
use serde::{
  de::{self, Visitor},
  Deserialize, Serialize,
};
use std::borrow::Cow;
use validator::Validate;

#[derive(Debug, Clone, Eq, PartialEq, Validate, Hash)]
/// Value of the `iss` claim stamped on every token this server issues.
/// Any non-empty string is accepted, e.g., `recordsaas` or `https://auth.example.com`.
pub struct Issuer {
  #[validate(length(min = 1))]
  value: String,
}
impl<'a, T: Into<Cow<'a, str>>> TryNewField<T> for Issuer {
  fn new(input: T) -> Result<Self> {
    let value = input.into().trim().to_string();
    let object = Self { value };
    object.validate()?;
    Ok(object)
  }
}

impl Field for Issuer {
  fn as_str(&self) -> &str {
    &self.value
  }
  fn into_string(self) -> String {
    self.value
  }
}
impl Serialize for Issuer {
  fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    serializer.serialize_str(self.as_str())
  }
}
impl<'de> Deserialize<'de> for Issuer {
  fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    struct IssuerVisitor;
    impl<'de> Visitor<'de> for IssuerVisitor {
      type Value = Issuer;
      fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("issuer string")
      }
      fn visit_str<E>(self, str: &str) -> Result<Self::Value, E>
      where
        E: de::Error,
      {
        Issuer::new(str).map_err(E::custom)
      }
    }

    deserializer.deserialize_str(IssuerVisitor)
  }
}
