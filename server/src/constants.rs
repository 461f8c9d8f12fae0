pub const THREAD_NAME: &str = "entitlement_server";

pub const DEFAULT_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_PORT: &str = "3000";
pub const DEFAULT_SITE_URL: &str = "http://localhost:3000";

// Identity provider
/// Google endpoint introspecting ID tokens
pub const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

// Billing provider
pub const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";
/// Page size of list calls. Only the newest items matter for reconciliation.
pub const STRIPE_LIST_LIMIT: usize = 25;
/// Accepted clock skew of webhook signature timestamps in seconds
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;
pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

/// Subscription statuses counted as a running subscription
pub const ACTIVE_LIKE_STATUSES: &[&str] = &["active", "trialing"];

// Customer metadata keys used as a write-back cache
pub const META_ACTIVE: &str = "active";
pub const META_PLAN: &str = "plan";
pub const META_REGION: &str = "region";
pub const META_ACTIVATED_AT: &str = "activated_at";
pub const META_SUBSCRIPTION_ID: &str = "subscription_id";
pub const META_SUBSCRIPTION_STATUS: &str = "subscription_status";
pub const META_PICTURE: &str = "picture";
pub const META_LAST_PAYMENT_FAILED_AT: &str = "last_payment_failed_at";
