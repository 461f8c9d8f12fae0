mod claims;
mod codec;
mod constants;
mod error;
mod keys;
mod license;
mod tokens;

pub mod token_fields;

pub use claims::{DesktopCodeClaims, EntitlementClaims, Identity, SessionClaims, TokenKind, TypedClaims};
pub use codec::{system_clock, Clock, RawClaims, TokenSigner, TokenVerifier, VerifiedToken, VerifyOptions};
pub use constants::*;
pub use error::{TokenError, TokenResult};
pub use keys::{SigningKey, ValidationKey};
pub use license::{lifetime_valid_until, LicenseSnapshot, Plan, Region};
