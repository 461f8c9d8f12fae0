use super::ApiError;
use crate::log::*;
use axum::{
  body::Bytes,
  extract::{
    rejection::{JsonRejection, QueryRejection},
    FromRequest, FromRequestParts, Query, Request,
  },
  http::request::Parts,
  Json,
};
use serde::de::DeserializeOwned;

/// JSON request body. Rejections answer with the usual `{error}` shape and never echo the input.
pub struct JsonBody<T>(pub T);

/// JSON request body that may be omitted. An empty body yields `T::default()`.
pub struct OptionalJsonBody<T>(pub T);

/// Query string parameters, rejected like [`JsonBody`]
pub struct QueryParams<T>(pub T);

fn json_rejection(e: JsonRejection) -> ApiError {
  debug!("Request body rejected: {}", e.body_text());
  let message = match e {
    JsonRejection::MissingJsonContentType(_) => "Expected an application/json body",
    JsonRejection::JsonSyntaxError(_) => "Malformed JSON body",
    JsonRejection::JsonDataError(_) => "Missing or invalid fields in request body",
    _ => "Unreadable request body",
  };
  ApiError::InvalidRequest(message.to_string())
}

#[axum::async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
  T: DeserializeOwned,
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
    let Json(value) = Json::<T>::from_request(req, state).await.map_err(json_rejection)?;
    Ok(JsonBody(value))
  }
}

#[axum::async_trait]
impl<T, S> FromRequest<S> for OptionalJsonBody<T>
where
  T: DeserializeOwned + Default,
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
    let bytes = Bytes::from_request(req, state).await.map_err(|e| {
      debug!("Request body unreadable: {e}");
      ApiError::InvalidRequest("Unreadable request body".to_string())
    })?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
      return Ok(OptionalJsonBody(T::default()));
    }
    let value = serde_json::from_slice(&bytes).map_err(|e| {
      debug!("Request body rejected: {e}");
      ApiError::InvalidRequest("Missing or invalid fields in request body".to_string())
    })?;
    Ok(OptionalJsonBody(value))
  }
}

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for QueryParams<T>
where
  T: DeserializeOwned,
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
    let Query(value) = Query::<T>::from_request_parts(parts, state)
      .await
      .map_err(|e: QueryRejection| {
        debug!("Query rejected: {}", e.body_text());
        ApiError::InvalidRequest("Invalid query string".to_string())
      })?;
    Ok(QueryParams(value))
  }
}
