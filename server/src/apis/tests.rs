use super::router;
use crate::{
  checkout::{lookup_key, PriceCatalog},
  constants::*,
  ledger::RedeemedCodes,
  providers::{
    billing::{fake::FakeBilling, BillingProvider, Customer, Price, Subscription},
    identity::{IdentityAssertion, IdentityProvider},
    ProviderError, ProviderResult,
  },
  state::{AppState, CryptoState, ProviderState},
  webhook::tests::{sign, SECRET},
};
use async_trait::async_trait;
use axum::{
  body::{to_bytes, Body},
  http::{header, Method, Request, StatusCode},
  Router,
};
use chrono::{DateTime, Duration, Utc};
use libcommon::{
  token_fields::{Email, Field, Issuer, Subject, TryNewField},
  Identity, Plan, Region, SigningKey, TokenSigner, TokenVerifier,
};
use serde_json::{json, Value};
use std::sync::{atomic::Ordering, Arc};
use tower::ServiceExt;

const RSA_PRIVATE_KEY: &str = include_str!("../../../common/tests/keys/signing.pem");
const ISSUER: &str = "https://recordsaas.example";

/// `good:<email>` verifies, `unverified:<email>` verifies with an unverified email, anything else is rejected
struct FakeIdentity;

#[async_trait]
impl IdentityProvider for FakeIdentity {
  async fn verify(&self, id_token: &str) -> ProviderResult<IdentityAssertion> {
    let (verified, email) = match id_token.split_once(':') {
      Some(("good", email)) => (true, email),
      Some(("unverified", email)) => (false, email),
      _ => {
        return Err(ProviderError::Rejected {
          status: 400,
          message: "invalid_token".to_string(),
        })
      }
    };
    Ok(IdentityAssertion {
      subject: format!("google-{email}"),
      email: Some(email.to_string()),
      email_verified: verified,
      name: Some("Alice".to_string()),
      picture: Some("https://example.com/alice.png".to_string()),
      audience: "client-id".to_string(),
    })
  }
}

struct Harness {
  app: Router,
  billing: Arc<FakeBilling>,
  now: DateTime<Utc>,
}

fn signer_at(t: DateTime<Utc>) -> anyhow::Result<TokenSigner> {
  let signer = TokenSigner::new(SigningKey::from_pem(RSA_PRIVATE_KEY)?, Issuer::new(ISSUER)?);
  Ok(signer.with_clock(Arc::new(move || t)))
}

fn harness_with(billing: Option<FakeBilling>, identity: bool) -> anyhow::Result<Harness> {
  let now = DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap();
  let billing = Arc::new(billing.unwrap_or_default());
  let prices: Vec<Price> = [Plan::Pro, Plan::Lifetime]
    .iter()
    .flat_map(|p| [Region::Global, Region::Br].map(|r| lookup_key(*p, r)))
    .map(|k| Price {
      id: format!("price_{k}"),
      lookup_key: Some(k),
    })
    .collect();
  *billing.prices.lock().unwrap() = prices;

  let state = AppState {
    listen_socket: "127.0.0.1:0".parse()?,
    site_url: "https://recordsaas.example".to_string(),
    crypto: CryptoState::new(signer_at(now)?, Arc::new(move || now)),
    providers: ProviderState {
      identity: identity.then(|| Arc::new(FakeIdentity) as Arc<dyn IdentityProvider>),
      billing: Some(billing.clone() as Arc<dyn BillingProvider>),
      webhook_secret: Some(SECRET.to_string()),
    },
    prices: PriceCatalog::default(),
    redeemed_codes: RedeemedCodes::default(),
  };
  Ok(Harness {
    app: router(Arc::new(state)),
    billing,
    now,
  })
}

fn harness() -> anyhow::Result<Harness> {
  harness_with(None, true)
}

impl Harness {
  async fn call(&self, req: Request<Body>) -> anyhow::Result<(StatusCode, Value)> {
    let res = self.app.clone().oneshot(req).await?;
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await?;
    Ok((status, serde_json::from_slice(&bytes).unwrap_or(Value::Null)))
  }

  async fn post(&self, uri: &str, bearer: Option<&str>, body: Value) -> anyhow::Result<(StatusCode, Value)> {
    let mut req = Request::builder()
      .method(Method::POST)
      .uri(uri)
      .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
      req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    self.call(req.body(Body::from(body.to_string()))?).await
  }

  async fn get(&self, uri: &str, bearer: Option<&str>) -> anyhow::Result<(StatusCode, Value)> {
    let mut req = Request::builder().uri(uri);
    if let Some(token) = bearer {
      req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    self.call(req.body(Body::empty())?).await
  }

  async fn login(&self, email: &str) -> anyhow::Result<Value> {
    let (status, body) = self
      .post("/api/auth/google", None, json!({"idToken": format!("good:{email}")}))
      .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    Ok(body)
  }

  fn add_subscription(&self, customer: &str, status: &str) {
    self.billing.subscriptions.lock().unwrap().push(Subscription {
      id: format!("sub_{customer}"),
      customer: Some(customer.to_string()),
      status: status.to_string(),
      current_period_end: Some(self.now + Duration::days(20)),
      created: self.now - Duration::days(10),
      cancel_at_period_end: false,
      cancel_at: None,
    });
  }
}

fn identity(email: &str) -> anyhow::Result<Identity> {
  Ok(Identity {
    subject: Subject::new(format!("google-{email}"))?,
    email: Email::new(email)?,
    name: None,
    picture: None,
  })
}

#[tokio::test]
async fn health_and_preflight() -> anyhow::Result<()> {
  let h = harness()?;
  let res = h
    .app
    .clone()
    .oneshot(Request::builder().uri("/health").body(Body::empty())?)
    .await?;
  assert_eq!(res.status(), StatusCode::OK);

  let req = Request::builder()
    .method(Method::OPTIONS)
    .uri("/api/auth/google")
    .body(Body::empty())?;
  let res = h.app.clone().oneshot(req).await?;
  assert_eq!(res.status(), StatusCode::NO_CONTENT);
  assert_eq!(
    res.headers().get(header::ACCESS_CONTROL_ALLOW_HEADERS).unwrap(),
    "Content-Type, Authorization"
  );
  Ok(())
}

#[tokio::test]
async fn web_login_issues_verifiable_tokens() -> anyhow::Result<()> {
  let h = harness()?;
  let body = h.login("alice@example.com").await?;
  assert_eq!(body["user"]["email"], "alice@example.com");
  assert_eq!(body["license"]["active"], false);
  assert_eq!(body["license"]["watermarkRequired"], true);
  assert!(body.get("checkout").is_none());

  // customer created with the avatar cached
  let customers = h.billing.customers.lock().unwrap().clone();
  assert_eq!(customers.len(), 1);
  assert_eq!(
    customers[0].metadata.get(META_PICTURE).map(String::as_str),
    Some("https://example.com/alice.png")
  );

  // a relying party verifies with only what the public key endpoint serves
  let (status, key) = h.get("/api/auth/public-key", None).await?;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(key["algorithm"], "RS256");
  let verifier = TokenVerifier::from_public_pem(key["publicKey"].as_str().unwrap(), key["issuer"].as_str().unwrap())?;
  let entitlement = verifier.verify_entitlement(body["entitlementToken"].as_str().unwrap())?;
  assert!(entitlement.claims.watermark_required);
  assert!(verifier.verify_session(body["sessionToken"].as_str().unwrap()).is_ok());
  assert!(verifier.verify_entitlement(body["sessionToken"].as_str().unwrap()).is_err());
  Ok(())
}

#[tokio::test]
async fn login_failures() -> anyhow::Result<()> {
  let h = harness()?;
  let (status, body) = h
    .post("/api/auth/google", None, json!({"idToken": "unverified:bob@example.com"}))
    .await?;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert!(body["error"].is_string());

  let (status, _) = h.post("/api/auth/google", None, json!({"idToken": "forged"})).await?;
  assert_eq!(status, StatusCode::UNAUTHORIZED);

  let unconfigured = harness_with(None, false)?;
  let (status, _) = unconfigured
    .post("/api/auth/google", None, json!({"idToken": "good:bob@example.com"}))
    .await?;
  assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
  Ok(())
}

#[tokio::test]
async fn desktop_code_is_nonce_bound_and_single_use() -> anyhow::Result<()> {
  let h = harness()?;
  let (status, body) = h
    .post(
      "/api/auth/google",
      None,
      json!({"idToken": "good:alice@example.com", "flow": "desktop", "nonce": "n-1"}),
    )
    .await?;
  assert_eq!(status, StatusCode::OK);
  assert!(body.get("sessionToken").is_none());
  let code = body["desktopCode"].as_str().unwrap().to_string();
  // customer exists before the code is redeemed
  assert_eq!(h.billing.customers.lock().unwrap().len(), 1);

  let (status, body) = h
    .post("/api/auth/desktop-exchange", None, json!({"desktopCode": code, "nonce": "n-2"}))
    .await?;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(body["error"], "Unauthorized");

  let (status, body) = h
    .post("/api/auth/desktop-exchange", None, json!({"desktopCode": code, "nonce": "n-1"}))
    .await?;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["user"]["email"], "alice@example.com");
  assert!(body["entitlementToken"].is_string());

  let (status, _) = h
    .post("/api/auth/desktop-exchange", None, json!({"desktopCode": code, "nonce": "n-1"}))
    .await?;
  assert_eq!(status, StatusCode::UNAUTHORIZED);

  // a session token is not a desktop code
  let session = h.login("alice@example.com").await?["sessionToken"].as_str().unwrap().to_string();
  let (status, _) = h
    .post("/api/auth/desktop-exchange", None, json!({"desktopCode": session}))
    .await?;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  Ok(())
}

#[tokio::test]
async fn desktop_code_survives_provider_outage() -> anyhow::Result<()> {
  let h = harness()?;
  let (status, body) = h
    .post("/api/auth/google", None, json!({"idToken": "good:alice@example.com", "flow": "desktop"}))
    .await?;
  assert_eq!(status, StatusCode::OK);
  let code = body["desktopCode"].as_str().unwrap().to_string();

  h.billing.down.store(true, Ordering::SeqCst);
  let (status, body) = h
    .post("/api/auth/desktop-exchange", None, json!({"desktopCode": code}))
    .await?;
  assert_eq!(status, StatusCode::BAD_GATEWAY);
  assert!(body["error"].is_string());

  h.billing.down.store(false, Ordering::SeqCst);
  let (status, _) = h
    .post("/api/auth/desktop-exchange", None, json!({"desktopCode": code}))
    .await?;
  assert_eq!(status, StatusCode::OK);
  let (status, _) = h
    .post("/api/auth/desktop-exchange", None, json!({"desktopCode": code}))
    .await?;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  Ok(())
}

#[tokio::test]
async fn desktop_login_requires_billing() -> anyhow::Result<()> {
  let h = harness()?;
  h.billing.down.store(true, Ordering::SeqCst);
  let (status, _) = h
    .post("/api/auth/google", None, json!({"idToken": "good:alice@example.com", "flow": "desktop"}))
    .await?;
  assert_eq!(status, StatusCode::BAD_GATEWAY);
  Ok(())
}

#[tokio::test]
async fn malformed_requests_get_json_errors() -> anyhow::Result<()> {
  let h = harness()?;
  let (status, body) = h.post("/api/auth/desktop-exchange", None, json!({})).await?;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].is_string());

  let nonce = "x".repeat(300);
  let (status, body) = h
    .post(
      "/api/auth/google",
      None,
      json!({"idToken": "good:alice@example.com", "flow": "desktop", "nonce": nonce}),
    )
    .await?;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(!body["error"].as_str().unwrap().contains(&nonce));
  assert!(h.billing.customers.lock().unwrap().is_empty());

  let req = Request::builder()
    .method(Method::POST)
    .uri("/api/auth/google")
    .header(header::CONTENT_TYPE, "application/json")
    .body(Body::from("{not json"))?;
  let (status, body) = h.call(req).await?;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], "Invalid request: Malformed JSON body");

  let session = h.login("alice@example.com").await?["sessionToken"].as_str().unwrap().to_string();
  let (status, body) = h
    .post("/api/create-checkout", Some(&session), json!({"plan": "platinum"}))
    .await?;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].is_string());
  let (status, body) = h
    .post("/api/auth/desktop-session", Some(&session), json!({"nonce": 42}))
    .await?;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].is_string());

  // the bridge body is optional
  let req = Request::builder()
    .method(Method::POST)
    .uri("/api/auth/desktop-session")
    .header(header::AUTHORIZATION, format!("Bearer {session}"))
    .body(Body::empty())?;
  let (status, body) = h.call(req).await?;
  assert_eq!(status, StatusCode::OK);
  assert!(body["desktopCode"].is_string());

  let (status, body) = h.get("/api/pricing?region=mars", None).await?;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], "Invalid request: Invalid query string");
  Ok(())
}

#[tokio::test]
async fn desktop_session_bridge() -> anyhow::Result<()> {
  let h = harness()?;
  let session = h.login("alice@example.com").await?["sessionToken"].as_str().unwrap().to_string();

  let (status, body) = h.post("/api/auth/desktop-session", Some(&session), json!({})).await?;
  assert_eq!(status, StatusCode::OK);
  let code = body["desktopCode"].as_str().unwrap().to_string();
  let (status, _) = h
    .post("/api/auth/desktop-exchange", None, json!({"desktopCode": code, "nonce": "ignored"}))
    .await?;
  assert_eq!(status, StatusCode::OK);

  let (status, _) = h.post("/api/auth/desktop-session", None, json!({})).await?;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  Ok(())
}

#[tokio::test]
async fn refresh_honors_grace_window() -> anyhow::Result<()> {
  let h = harness()?;
  h.login("alice@example.com").await?;
  h.add_subscription("cus_1", "active");

  let lapsed = signer_at(h.now - Duration::days(31))?.issue_session(&identity("alice@example.com")?)?;
  let (status, _) = h.get("/api/auth/status", Some(lapsed.as_str())).await?;
  assert_eq!(status, StatusCode::UNAUTHORIZED);

  let (status, body) = h.post("/api/auth/refresh", Some(lapsed.as_str()), json!({})).await?;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["license"]["active"], true);
  assert_eq!(body["license"]["plan"], "pro");
  assert_eq!(body["license"]["watermarkRequired"], false);

  let too_old = signer_at(h.now - Duration::days(38))?.issue_session(&identity("alice@example.com")?)?;
  let (status, _) = h.post("/api/auth/refresh", Some(too_old.as_str()), json!({})).await?;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  Ok(())
}

#[tokio::test]
async fn auth_status_resolves_license() -> anyhow::Result<()> {
  let h = harness()?;
  let session = h.login("alice@example.com").await?["sessionToken"].as_str().unwrap().to_string();
  let (status, body) = h.get("/api/auth/status", Some(&session)).await?;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["authenticated"], true);
  assert_eq!(body["license"]["active"], false);

  let (status, _) = h.get("/api/auth/status", Some("not.a.token")).await?;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  Ok(())
}

#[tokio::test]
async fn checkout_requires_login_and_rejects_conflicts() -> anyhow::Result<()> {
  let h = harness()?;
  let (status, body) = h.post("/api/create-checkout", None, json!({"plan": "pro"})).await?;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(body["code"], "LOGIN_REQUIRED");

  let session = h.login("alice@example.com").await?["sessionToken"].as_str().unwrap().to_string();
  let (status, body) = h
    .post(
      "/api/create-checkout",
      Some(&session),
      json!({"plan": "pro", "locale": "pt-BR", "email": "alice@example.com"}),
    )
    .await?;
  assert_eq!(status, StatusCode::OK);
  assert!(body["url"].is_string());
  assert_eq!(h.billing.created_checkouts.lock().unwrap()[0].price_id, "price_pro_br");

  h.add_subscription("cus_1", "active");
  let (status, body) = h.post("/api/create-checkout", Some(&session), json!({"plan": "pro"})).await?;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["code"], "ACTIVE_SUBSCRIPTION_EXISTS");
  assert_eq!(h.billing.created_checkouts.lock().unwrap().len(), 1);
  Ok(())
}

#[tokio::test]
async fn pending_checkout_resumes_after_login() -> anyhow::Result<()> {
  let h = harness()?;
  let (status, body) = h
    .post(
      "/api/auth/google",
      None,
      json!({"idToken": "good:alice@example.com", "pendingCheckout": {"plan": "lifetime", "locale": "en-US"}}),
    )
    .await?;
  assert_eq!(status, StatusCode::OK);
  assert!(body["checkout"]["url"].is_string());
  assert!(body["sessionToken"].is_string());
  assert_eq!(h.billing.created_checkouts.lock().unwrap()[0].price_id, "price_lifetime_global");
  Ok(())
}

#[tokio::test]
async fn pending_checkout_conflict_does_not_fail_login() -> anyhow::Result<()> {
  let billing = FakeBilling::with_customer(Customer {
    id: "cus_1".to_string(),
    email: Some("alice@example.com".to_string()),
    metadata: [(META_ACTIVE, "true"), (META_PLAN, "lifetime")]
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect(),
    ..Default::default()
  });
  let h = harness_with(Some(billing), true)?;
  let (status, body) = h
    .post(
      "/api/auth/google",
      None,
      json!({"idToken": "good:alice@example.com", "pendingCheckout": {"plan": "pro"}}),
    )
    .await?;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["license"]["plan"], "lifetime");
  assert_eq!(body["checkout"]["code"], "ACTIVE_LIFETIME_EXISTS");
  assert!(h.billing.created_checkouts.lock().unwrap().is_empty());
  Ok(())
}

#[tokio::test]
async fn cancel_subscription_at_period_end() -> anyhow::Result<()> {
  let h = harness()?;
  let session = h.login("alice@example.com").await?["sessionToken"].as_str().unwrap().to_string();
  let (status, body) = h.post("/api/cancel-subscription", Some(&session), json!({})).await?;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["code"], "NO_ACTIVE_SUBSCRIPTION");

  h.add_subscription("cus_1", "active");
  let (status, body) = h.post("/api/cancel-subscription", Some(&session), json!({})).await?;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["success"], true);
  let period_end = (h.now + Duration::days(20)).timestamp();
  assert_eq!(body["current_period_end"], period_end);
  assert_eq!(body["cancel_at"], period_end);
  assert!(h.billing.subscriptions.lock().unwrap()[0].cancel_at_period_end);
  Ok(())
}

#[tokio::test]
async fn webhook_requires_signature() -> anyhow::Result<()> {
  let h = harness()?;
  h.login("alice@example.com").await?;
  let payload = json!({
    "id": "evt_1",
    "type": "checkout.session.completed",
    "data": {"object": {"customer": "cus_1", "mode": "payment", "created": 1700000000,
                        "metadata": {"plan": "lifetime", "region": "br"}}}
  })
  .to_string();

  let req = Request::builder()
    .method(Method::POST)
    .uri("/api/webhooks/stripe")
    .header(STRIPE_SIGNATURE_HEADER, format!("t={},v1=deadbeef", h.now.timestamp()))
    .body(Body::from(payload.clone()))?;
  let (status, _) = h.call(req).await?;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(!h.billing.customer("cus_1").unwrap().metadata.contains_key(META_PLAN));

  let req = Request::builder()
    .method(Method::POST)
    .uri("/api/webhooks/stripe")
    .header(STRIPE_SIGNATURE_HEADER, sign(payload.as_bytes(), h.now.timestamp()))
    .body(Body::from(payload))?;
  let (status, body) = h.call(req).await?;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, json!({"received": true}));
  let metadata = h.billing.customer("cus_1").unwrap().metadata;
  assert_eq!(metadata.get(META_PLAN).map(String::as_str), Some("lifetime"));
  assert_eq!(metadata.get(META_REGION).map(String::as_str), Some("br"));

  // the next login sees the lifetime license
  let body = h.login("alice@example.com").await?;
  assert_eq!(body["license"]["active"], true);
  assert_eq!(body["license"]["plan"], "lifetime");
  Ok(())
}

#[tokio::test]
async fn pricing_by_region() -> anyhow::Result<()> {
  let h = harness()?;
  let (status, body) = h.get("/api/pricing?region=br", None).await?;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["currency"], "BRL");
  assert_eq!(body["pro"]["amount"], 27);
  assert_eq!(body["lifetime"]["amount"], 177);
  let (_, body) = h.get("/api/pricing", None).await?;
  assert_eq!(body["region"], "global");
  Ok(())
}
