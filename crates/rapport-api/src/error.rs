//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use rapport_core::Error as CoreError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// The request is well-formed but the target's state forbids it.
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("internal error: {0}")]
  Internal(String),
}

impl From<rapport_engine::Error> for ApiError {
  fn from(e: rapport_engine::Error) -> Self {
    match e {
      rapport_engine::Error::Store(e) => Self::Store(e),
      rapport_engine::Error::Core(e) => e.into(),
    }
  }
}

impl From<CoreError> for ApiError {
  fn from(e: CoreError) -> Self {
    match e {
      e if e.is_not_found() => Self::NotFound(e.to_string()),
      e @ CoreError::InvalidTransition { .. } => Self::Conflict(e.to_string()),
      e @ (CoreError::SelfPair(_)
      | CoreError::InvalidConfig(_)
      | CoreError::UnknownStrategy(_)
      | CoreError::MissingAssignee
      | CoreError::MissingResolutionNote) => Self::BadRequest(e.to_string()),
      e => Self::Internal(e.to_string()),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Store(e) => {
        tracing::warn!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
      ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
