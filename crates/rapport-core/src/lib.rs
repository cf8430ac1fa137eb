//! Core types and calculators for the Rapport relationship valuation engine.
//!
//! Every calculator in this crate is a pure, synchronous function of its
//! inputs and the [`config::EngineConfig`] it was built from. Persistence is
//! expressed only through the [`store::ValuationStore`] trait; this crate has
//! no HTTP or database dependencies.

pub mod config;
pub mod density;
pub mod edge;
pub mod error;
pub mod factor;
pub mod lambda;
pub mod ledger;
pub mod node;
pub mod risk;
pub mod sigma;
pub mod snapshot;
pub mod store;
pub mod valuation;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use valuation::Valuator;
