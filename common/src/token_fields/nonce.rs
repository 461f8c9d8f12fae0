use super::{Field, TryNewField};
use anyhow::Result;
use serde::{
  de::{self, Visitor},
  Deserialize, Serialize,
};
use std::borrow::Cow;
use validator::Validate;

#[derive(Debug, Clone, Eq, PartialEq, Validate)]
/// Caller-chosen value bound into a desktop exchange code, echoed back at redemption.
pub struct Nonce {
  #[validate(length(min = 1, max = 256))]
  value: String,
}
impl<'a, T: Into<Cow<'a, str>>> TryNewField<T> for Nonce {
  fn new(nonce: T) -> Result<Self> {
    let value = nonce.into().to_string();
    let object = Self { value };
    object.validate()?;
    Ok(object)
  }
}
impl Field for Nonce {
  fn as_str(&self) -> &str {
    &self.value
  }
  fn into_string(self) -> String {
    self.value
  }
}
impl Serialize for Nonce {
  fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    serializer.serialize_str(self.as_str())
  }
}
impl<'de> Deserialize<'de> for Nonce {
  fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    struct NonceVisitor;
    impl<'de> Visitor<'de> for NonceVisitor {
      type Value = Nonce;
      fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("nonce string")
      }
      fn visit_str<E>(self, str: &str) -> Result<Self::Value, E>
      where
        E: de::Error,
      {
        Nonce::new(str).map_err(E::custom)
      }
    }

    deserializer.deserialize_str(NonceVisitor)
  }
}
