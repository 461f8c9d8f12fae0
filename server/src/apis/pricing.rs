use super::{extract::QueryParams, request::PricingQuery, response::PricingResponse};
use crate::checkout::display_price;
use axum::Json;
use libcommon::Plan;

pub async fn pricing(QueryParams(query): QueryParams<PricingQuery>) -> Json<PricingResponse> {
  let region = query.region.unwrap_or_default();
  let pro = display_price(Plan::Pro, region);
  Json(PricingResponse {
    region,
    currency: pro.currency,
    lifetime: display_price(Plan::Lifetime, region),
    pro,
  })
}
