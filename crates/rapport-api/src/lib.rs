//! JSON REST API for Rapport.
//!
//! Exposes an axum [`Router`] over a [`Recomputer`] backed by any
//! [`rapport_core::store::ValuationStore`]. Auth, tenancy checks and TLS are
//! the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", rapport_api::api_router(engine.clone()))
//! ```

pub mod activity;
pub mod error;
pub mod nodes;
pub mod pairs;
pub mod risks;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use rapport_core::store::ValuationStore;
use rapport_engine::Recomputer;

pub use error::ApiError;

/// Build a fully-materialised API router for `engine`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(engine: Arc<Recomputer<S>>) -> Router<()>
where
  S: ValuationStore + 'static,
{
  Router::new()
    // Nodes
    .route("/nodes", get(nodes::list::<S>).post(nodes::create::<S>))
    .route("/nodes/{id}", get(nodes::get_one::<S>))
    .route("/nodes/{id}/factors", post(nodes::update_factors::<S>))
    .route("/nodes/{id}/status", post(nodes::set_status::<S>))
    .route("/nodes/{id}/lambda-history", get(nodes::lambda_history::<S>))
    .route("/nodes/{id}/snapshot", get(nodes::snapshot::<S>))
    .route("/nodes/{id}/recompute", post(nodes::recompute::<S>))
    // Edges, density and pair valuation
    .route("/edges", post(pairs::update_edge::<S>))
    .route("/density", post(pairs::record_density::<S>))
    .route("/pairs/{a}/{b}", get(pairs::get_edge::<S>))
    .route("/pairs/{a}/{b}/density", get(pairs::density::<S>))
    .route("/pairs/{a}/{b}/snapshot", get(pairs::snapshot::<S>))
    .route("/pairs/{a}/{b}/recompute", post(pairs::recompute::<S>))
    // Interactions and rollups
    .route("/interactions", post(activity::ingest::<S>))
    .route("/orgs/{id}/rollup", get(activity::rollup::<S>))
    // Risk queue
    .route("/risks", get(risks::list::<S>))
    .route("/risks/{id}", get(risks::get_one::<S>))
    .route("/risks/{id}/transitions", post(risks::transition::<S>))
    .with_state(engine)
}
