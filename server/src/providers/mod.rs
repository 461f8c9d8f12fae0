pub mod billing;
pub mod identity;

use thiserror::Error;

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Describes things that can go wrong when talking to an external provider
#[derive(Debug, Error)]
pub enum ProviderError {
  #[error("Provider is unreachable: {0}")]
  Unavailable(String),
  #[error("Provider rejected the request ({status}): {message}")]
  Rejected { status: u16, message: String },
  #[error("Failed to decode provider response: {0}")]
  Decode(String),
}

impl From<reqwest::Error> for ProviderError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() {
      ProviderError::Decode(e.to_string())
    } else {
      ProviderError::Unavailable(e.to_string())
    }
  }
}
