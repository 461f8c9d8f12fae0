use chrono::Duration;

/// The only signature scheme issued and accepted
pub const TOKEN_ALGORITHM: &str = "RS256";
/// `typ` header value
pub const TOKEN_TYPE: &str = "JWT";

/// Session token lifetime: 30 days
pub const SESSION_TTL_SECS: i64 = 30 * 24 * 60 * 60;
/// Entitlement token lifetime: 30 days
pub const ENTITLEMENT_TTL_SECS: i64 = 30 * 24 * 60 * 60;
/// Desktop exchange code lifetime: 120 seconds
pub const DESKTOP_CODE_TTL_SECS: i64 = 120;
/// How long past `exp` a session token is still accepted by the refresh endpoint: 7 days
pub const SESSION_REFRESH_GRACE_SECS: i64 = 7 * 24 * 60 * 60;

/// Lifetime plans are valid this many months past activation (30 years)
pub const LIFETIME_VALIDITY_MONTHS: u32 = 30 * 12;

pub fn session_ttl() -> Duration {
  Duration::seconds(SESSION_TTL_SECS)
}
pub fn entitlement_ttl() -> Duration {
  Duration::seconds(ENTITLEMENT_TTL_SECS)
}
pub fn desktop_code_ttl() -> Duration {
  Duration::seconds(DESKTOP_CODE_TTL_SECS)
}
pub fn session_refresh_grace() -> Duration {
  Duration::seconds(SESSION_REFRESH_GRACE_SECS)
}

/// Audience of session tokens
pub const AUDIENCE_API: &str = "api";
/// Audience of entitlement tokens
pub const AUDIENCE_DESKTOP: &str = "desktop";
/// Audience of desktop exchange codes
pub const AUDIENCE_DESKTOP_EXCHANGE: &str = "desktop-exchange";
