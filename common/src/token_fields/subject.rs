use super::{Field, TryNewField};
use anyhow::Result;
use serde::{
  de::{self, Visitor},
  Deserialize, Serialize,
};
use std::borrow::Cow;
use validator::Validate;

#[derive(Debug, Clone, Eq, PartialEq, Validate, Hash)]
/// Stable account identifier carried in `sub`, taken from the identity provider's subject.
pub struct Subject {
  #[validate(length(min = 1, max = 255))]
  value: String,
}
impl<'a, T: Into<Cow<'a, str>>> TryNewField<T> for Subject {
  fn new(sub: T) -> Result<Self> {
    let value = sub.into().to_string();
    let object = Self { value };
    object.validate()?;
    Ok(object)
  }
}
impl Field for Subject {
  fn as_str(&self) -> &str {
    &self.value
  }
  fn into_string(self) -> String {
    self.value
  }
}
impl Serialize for Subject {
  fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    serializer.serialize_str(self.as_str())
  }
}
impl<'de> Deserialize<'de> for Subject {
  fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    struct SubjectVisitor;
    impl<'de> Visitor<'de> for SubjectVisitor {
      type Value = Subject;
      fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("subject string")
      }
      fn visit_str<E>(self, str: &str) -> Result<Self::Value, E>
      where
        E: de::Error,
      {
        Subject::new(str).map_err(E::custom)
      }
    }

    deserializer.deserialize_str(SubjectVisitor)
  }
}
