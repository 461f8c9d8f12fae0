use super::{Field, TryNewField};
use anyhow::Result;
use serde::{
  de::{self, Visitor},
  Deserialize, Serialize,
};
use std::borrow::Cow;
use validator::Validate;

#[derive(Debug, Clone, Eq, PartialEq, Validate, Hash)]
/// Verified e-mail address. It is also the key used to find the billing customer.
pub struct Email {
  #[validate(email)]
  value: String,
}
impl<'a, T: Into<Cow<'a, str>>> TryNewField<T> for Email {
  fn new(email: T) -> Result<Self> {
    let value = email.into().trim().to_string();
    let object = Self { value };
    object.validate()?;
    Ok(object)
  }
}
impl Field for Email {
  fn as_str(&self) -> &str {
    &self.value
  }
  fn into_string(self) -> String {
    self.value
  }
}
impl Serialize for Email {
  fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    serializer.serialize_str(self.as_str())
  }
}
impl<'de> Deserialize<'de> for Email {
  fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    struct EmailVisitor;
    impl<'de> Visitor<'de> for EmailVisitor {
      type Value = Email;
      fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("email string")
      }
      fn visit_str<E>(self, str: &str) -> Result<Self::Value, E>
      where
        E: de::Error,
      {
        Email::new(str).map_err(E::custom)
      }
    }

    deserializer.deserialize_str(EmailVisitor)
  }
}
