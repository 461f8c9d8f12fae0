use super::{bearer::Session, response::CancelSubscriptionResponse, ApiError};
use crate::{
  constants::META_SUBSCRIPTION_ID,
  license::pick_active_subscription,
  log::*,
  providers::billing::{BillingProvider, Customer, Subscription},
  state::AppState,
};
use axum::{extract::State, Json};
use libcommon::token_fields::Field;
use std::sync::Arc;

/// The cached subscription if still running, otherwise the best running one from the live list
async fn find_active_subscription(billing: &dyn BillingProvider, customer: &Customer) -> Result<Subscription, ApiError> {
  if let Some(id) = customer.metadata.get(META_SUBSCRIPTION_ID) {
    match billing.get_subscription(id).await {
      Ok(sub) if sub.is_active_like() => return Ok(sub),
      Ok(_) => (),
      Err(e) => warn!("[{}] Failed to fetch cached subscription {id}: {e}", customer.id),
    }
  }
  let subscriptions = billing.list_subscriptions(&customer.id).await?;
  pick_active_subscription(&subscriptions)
    .cloned()
    .ok_or(ApiError::NoActiveSubscription)
}

pub async fn cancel_subscription(
  State(state): State<Arc<AppState>>,
  Session(session): Session,
) -> Result<Json<CancelSubscriptionResponse>, ApiError> {
  let billing = state.billing()?;
  let email = session.claims.identity.email.as_str();
  let Some(customer) = billing.find_customer_by_email(email).await? else {
    return Err(ApiError::NoActiveSubscription);
  };
  let subscription = find_active_subscription(billing, &customer).await?;
  let canceled = billing.cancel_subscription_at_period_end(&subscription.id).await?;
  info!("[{}] Subscription {} set to cancel at period end", customer.id, canceled.id);

  let current_period_end = canceled.current_period_end.map(|t| t.timestamp());
  Ok(Json(CancelSubscriptionResponse {
    success: true,
    message: "Subscription will be canceled at the end of the current billing period".to_string(),
    cancel_at: canceled.cancel_at.map(|t| t.timestamp()).or(current_period_end),
    current_period_end,
  }))
}
