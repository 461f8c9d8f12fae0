mod apis;
mod checkout;
mod config;
mod constants;
mod error;
mod ledger;
mod license;
mod log;
mod providers;
mod state;
mod webhook;

use crate::{constants::*, error::*, log::*, state::AppState};
use config::parse_opts;
use std::sync::Arc;
use tokio::runtime::Builder;

fn main() -> Result<()> {
  if let Err(e) = dotenvy::dotenv() {
    if !e.not_found() {
      eprintln!("Failed to load .env: {e}");
    }
  }
  init_logger();

  let mut runtime_builder = Builder::new_multi_thread();
  runtime_builder.enable_all();
  runtime_builder.thread_name(THREAD_NAME);
  let runtime = runtime_builder.build()?;

  runtime.block_on(async {
    match parse_opts().await {
      Ok(Some(shared_state)) => define_route(Arc::new(shared_state)).await,
      Ok(None) => (),
      Err(e) => error!("{e:#}"),
    };
  });

  Ok(())
}

async fn define_route(shared_state: Arc<AppState>) {
  let addr = shared_state.listen_socket;
  let tcp_listener = match tokio::net::TcpListener::bind(&addr).await {
    Ok(listener) => listener,
    Err(e) => {
      error!("Failed to bind {addr}: {e}");
      return;
    }
  };
  info!("Listening on {}", &addr);

  let router = apis::router(shared_state);
  let server = axum::serve(tcp_listener, router);

  if let Err(e) = server.await {
    error!("Server is down!: {e}");
  }
}
