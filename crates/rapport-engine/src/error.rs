//! Error type for `rapport-engine`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] rapport_core::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::Core(e) if e.is_not_found())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
