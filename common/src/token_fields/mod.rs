mod email;
mod issuer;
mod nonce;
mod signed_token;
mod subject;

pub use email::Email;
pub use issuer::Issuer;
pub use nonce::Nonce;
pub use signed_token::SignedToken;
pub use subject::Subject;

pub trait Field
where
  Self: std::marker::Sized,
{
  fn as_str(&self) -> &str;
  fn into_string(self) -> String;
}

pub trait TryNewField<T>
where
  Self: std::marker::Sized,
{
  fn new(input: T) -> Result<Self, anyhow::Error>;
}
