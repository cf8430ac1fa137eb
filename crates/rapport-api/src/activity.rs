//! Interaction ingestion and organisation rollups.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/interactions` | Body: `{"from_node":…,"to_node":…,"real_minutes":…,"activity_type":"invested"}` |
//! | `GET`  | `/orgs/:id/rollup` | Totals over the latest snapshots |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use rapport_core::{ledger::Interaction, snapshot::OrgRollup, store::ValuationStore};
use rapport_engine::Recomputer;
use uuid::Uuid;

use crate::error::ApiError;

/// `POST /interactions`
pub async fn ingest<S: ValuationStore>(
  State(engine): State<Arc<Recomputer<S>>>,
  Json(body): Json<Interaction>,
) -> Result<impl IntoResponse, ApiError> {
  if !body.real_minutes.is_finite() {
    return Err(ApiError::BadRequest("real_minutes must be a number".to_owned()));
  }
  let outcome = engine.ingest_interaction(body).await?;
  Ok((StatusCode::CREATED, Json(outcome)))
}

/// `GET /orgs/:id/rollup`
pub async fn rollup<S: ValuationStore>(
  State(engine): State<Arc<Recomputer<S>>>,
  Path(org_id): Path<Uuid>,
) -> Result<Json<OrgRollup>, ApiError> {
  Ok(Json(engine.rollup(org_id).await?))
}
