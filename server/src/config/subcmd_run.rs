use super::{verify_url, ClapSubCommand};
use crate::{
  checkout::PriceCatalog,
  constants::{DEFAULT_ADDRESS, DEFAULT_PORT, DEFAULT_SITE_URL},
  error::*,
  ledger::RedeemedCodes,
  log::*,
  providers::{
    billing::{BillingProvider, StripeClient},
    identity::{GoogleIdentityProvider, IdentityProvider},
  },
  state::{AppState, CryptoState, ProviderState},
};
use async_trait::async_trait;
use clap::{Arg, ArgGroup, ArgMatches, Command};
use libcommon::{
  system_clock,
  token_fields::{Issuer, TryNewField},
  SigningKey, TokenSigner, ValidationKey,
};
use std::{fs, net::SocketAddr, sync::Arc};

pub(super) struct Run {}

/// Load the private key and cross-check the configured public key against it
fn load_signing_key(sub_m: &ArgMatches) -> Result<SigningKey> {
  let pem = match (
    sub_m.get_one::<String>("private_key"),
    sub_m.get_one::<String>("private_key_path"),
  ) {
    (Some(pem), _) => pem.clone(),
    (None, Some(path)) => fs::read_to_string(path).with_context(|| format!("Failed to read private key from {path}"))?,
    (None, None) => bail!("Private key must be specified"),
  };
  let signing_key = SigningKey::from_pem(&pem)?;

  if let Some(public_pem) = sub_m.get_one::<String>("public_key") {
    let configured = ValidationKey::from_pem(public_pem)?;
    ensure!(
      configured == signing_key.validation_key(),
      "Public key does not match the private key"
    );
  }
  Ok(signing_key)
}

#[async_trait]
impl ClapSubCommand for Run {
  fn subcmd() -> Command {
    Command::new("run")
      .about("Run the session and entitlement token server")
      .arg(
        Arg::new("listen_address")
          .short('l')
          .long("listen-address")
          .env("LISTEN_ADDRESS")
          .value_name("ADDRESS")
          .default_value(DEFAULT_ADDRESS)
          .help("Listen address"),
      )
      .arg(
        Arg::new("port")
          .short('p')
          .long("port")
          .env("PORT")
          .value_name("PORT")
          .default_value(DEFAULT_PORT)
          .help("Listen port"),
      )
      .arg(
        Arg::new("token_issuer")
          .short('t')
          .long("token-issuer")
          .env("TOKEN_ISSUER")
          .required(true)
          .value_name("ISSUER")
          .help("Issuer of every token, like \"recordsaas\" or \"https://example.com\""),
      )
      .arg(
        Arg::new("private_key")
          .long("private-key")
          .env("JWT_PRIVATE_KEY")
          .hide_env_values(true)
          .value_name("PEM")
          .help("RSA private key PEM. Literal \\n escapes are accepted"),
      )
      .arg(
        Arg::new("private_key_path")
          .short('s')
          .long("private-key-path")
          .env("JWT_PRIVATE_KEY_PATH")
          .value_name("PATH")
          .help("RSA private key PEM file path"),
      )
      .group(
        ArgGroup::new("signing_key")
          .args(["private_key", "private_key_path"])
          .required(true),
      )
      .arg(
        Arg::new("public_key")
          .long("public-key")
          .env("JWT_PUBLIC_KEY")
          .value_name("PEM")
          .help("RSA public key PEM. Derived from the private key if not specified"),
      )
      .arg(
        Arg::new("stripe_secret_key")
          .long("stripe-secret-key")
          .env("STRIPE_SECRET_KEY")
          .hide_env_values(true)
          .value_name("KEY")
          .help("Stripe secret key. Billing endpoints are unavailable without it"),
      )
      .arg(
        Arg::new("stripe_webhook_secret")
          .long("stripe-webhook-secret")
          .env("STRIPE_WEBHOOK_SECRET")
          .hide_env_values(true)
          .value_name("SECRET")
          .help("Stripe webhook signing secret"),
      )
      .arg(
        Arg::new("google_client_id")
          .long("google-client-id")
          .env("GOOGLE_CLIENT_ID")
          .value_name("CLIENT_ID")
          .help("Google OAuth client id identity assertions must be issued for"),
      )
      .arg(
        Arg::new("site_url")
          .long("site-url")
          .env("SITE_URL")
          .value_parser(verify_url)
          .value_name("URL")
          .default_value(DEFAULT_SITE_URL)
          .help("Site base url used for checkout redirects"),
      )
  }

  async fn exec_matches(sub_m: &ArgMatches) -> Result<Option<crate::AppState>> {
    let Some(address) = sub_m.get_one::<String>("listen_address") else {
      bail!("Listen address must be specified");
    };
    let Some(port) = sub_m.get_one::<String>("port") else {
      bail!("Port must be specified");
    };
    let listen_socket = format!("{}:{}", address, port).parse::<SocketAddr>()?;

    let issuer = match sub_m.get_one::<String>("token_issuer") {
      Some(t) => Issuer::new(t)?,
      None => {
        bail!("Issuer must be specified");
      }
    };
    let signing_key = load_signing_key(sub_m)?;
    let signer = TokenSigner::new(signing_key, issuer);
    info!("Token signing key loaded (kid: {})", signer.verifier().validation_key().key_id()?);

    let http = reqwest::Client::builder().user_agent(env!("CARGO_PKG_NAME")).build()?;
    let identity = match sub_m.get_one::<String>("google_client_id") {
      Some(client_id) => Some(Arc::new(GoogleIdentityProvider::new(http.clone(), client_id)?) as Arc<dyn IdentityProvider>),
      None => {
        warn!("No Google client id given. Identity login is unavailable");
        None
      }
    };
    let billing = match sub_m.get_one::<String>("stripe_secret_key") {
      Some(key) => Some(Arc::new(StripeClient::new(http, key)) as Arc<dyn BillingProvider>),
      None => {
        warn!("No Stripe secret key given. Billing endpoints are unavailable");
        None
      }
    };
    let webhook_secret = sub_m.get_one::<String>("stripe_webhook_secret").cloned();

    let Some(site_url) = sub_m.get_one::<String>("site_url") else {
      bail!("Site url must be specified");
    };

    Ok(Some(AppState {
      listen_socket,
      site_url: site_url.clone(),
      crypto: CryptoState::new(signer, system_clock()),
      providers: ProviderState {
        identity,
        billing,
        webhook_secret,
      },
      prices: PriceCatalog::default(),
      redeemed_codes: RedeemedCodes::default(),
    }))
  }
}
