//! Error type for `rapport-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] rapport_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored column held a value no domain type accepts.
  #[error("cannot decode column {column}: {message}")]
  Decode { column: &'static str, message: String },

  #[error("node already exists: {0}")]
  NodeExists(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
