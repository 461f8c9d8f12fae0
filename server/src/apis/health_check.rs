use crate::log::*;

pub async fn health_check() -> &'static str {
  debug!("health_check invoked");
  "Works at least as a server. Providers are checked per request."
}
