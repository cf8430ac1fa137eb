//! Handlers for `/risks` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/risks` | Optional `?status=open\|assigned\|…`; most urgent first |
//! | `GET`  | `/risks/:id` | 404 if not found |
//! | `POST` | `/risks/:id/transitions` | Body: `{"action":"assign","assignee":"…"}`; 409 on an illegal move |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use rapport_core::{
  risk::{RiskAction, RiskRecord, RiskStatus},
  store::ValuationStore,
};
use rapport_engine::Recomputer;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub status: Option<RiskStatus>,
}

/// `GET /risks[?status=<status>]`
pub async fn list<S: ValuationStore>(
  State(engine): State<Arc<Recomputer<S>>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<RiskRecord>>, ApiError> {
  Ok(Json(engine.list_risks(params.status).await?))
}

/// `GET /risks/:id`
pub async fn get_one<S: ValuationStore>(
  State(engine): State<Arc<Recomputer<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<RiskRecord>, ApiError> {
  Ok(Json(engine.get_risk(id).await?))
}

/// `POST /risks/:id/transitions`
pub async fn transition<S: ValuationStore>(
  State(engine): State<Arc<Recomputer<S>>>,
  Path(id): Path<Uuid>,
  Json(action): Json<RiskAction>,
) -> Result<Json<RiskRecord>, ApiError> {
  Ok(Json(engine.transition_risk(id, action).await?))
}
