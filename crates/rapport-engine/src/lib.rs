//! The Rapport recompute pipeline.
//!
//! [`Recomputer`] turns factor updates, density samples and interactions into
//! persisted valuation snapshots and queued risk records, through any
//! [`rapport_core::store::ValuationStore`].

mod locks;
mod pipeline;

pub mod error;

pub use error::{Error, Result};
pub use locks::KeyedLocks;
pub use pipeline::{DensityReading, IngestOutcome, PairRecompute, Recomputer, UpdatedNode};
