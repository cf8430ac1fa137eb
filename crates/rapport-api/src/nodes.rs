//! Handlers for `/nodes` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/nodes` | Optional `?org_id=<uuid>` |
//! | `POST` | `/nodes` | Body: `{"org_id":"…","role":"…","factors":{…}}` |
//! | `GET`  | `/nodes/:id` | 404 if not found |
//! | `POST` | `/nodes/:id/factors` | Body: factor patch plus optional `reason` |
//! | `POST` | `/nodes/:id/status` | Body: `{"status":"inactive"}` |
//! | `GET`  | `/nodes/:id/lambda-history` | Newest first |
//! | `GET`  | `/nodes/:id/snapshot` | Latest node snapshot |
//! | `POST` | `/nodes/:id/recompute` | Writes a fresh snapshot |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use rapport_core::{
  node::{FactorPatch, LambdaChange, NewNode, Node, NodeFactorUpdate, NodeStatus},
  snapshot::{EntityKey, ValuationSnapshot},
  store::ValuationStore,
};
use rapport_engine::{Recomputer, UpdatedNode};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub org_id: Option<Uuid>,
}

/// `GET /nodes[?org_id=<uuid>]`
pub async fn list<S: ValuationStore>(
  State(engine): State<Arc<Recomputer<S>>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Node>>, ApiError> {
  Ok(Json(engine.list_nodes(params.org_id).await?))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /nodes`
pub async fn create<S: ValuationStore>(
  State(engine): State<Arc<Recomputer<S>>>,
  Json(body): Json<NewNode>,
) -> Result<impl IntoResponse, ApiError> {
  let node = engine.create_node(body).await?;
  Ok((StatusCode::CREATED, Json(node)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /nodes/:id`
pub async fn get_one<S: ValuationStore>(
  State(engine): State<Arc<Recomputer<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Node>, ApiError> {
  Ok(Json(engine.get_node(id).await?))
}

// ─── Factors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct FactorsBody {
  #[serde(flatten)]
  pub factors: FactorPatch,
  pub reason:  Option<String>,
}

/// `POST /nodes/:id/factors`, recomputing λ and recording the change.
pub async fn update_factors<S: ValuationStore>(
  State(engine): State<Arc<Recomputer<S>>>,
  Path(id): Path<Uuid>,
  Json(body): Json<FactorsBody>,
) -> Result<Json<UpdatedNode>, ApiError> {
  if body.factors.is_empty() {
    return Err(ApiError::BadRequest("no factors given".to_owned()));
  }
  let updated = engine
    .apply_node_update(NodeFactorUpdate {
      node_id: id,
      factors: body.factors,
      reason:  body.reason,
    })
    .await?;
  Ok(Json(updated))
}

// ─── Status ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StatusBody {
  pub status: NodeStatus,
}

/// `POST /nodes/:id/status`
pub async fn set_status<S: ValuationStore>(
  State(engine): State<Arc<Recomputer<S>>>,
  Path(id): Path<Uuid>,
  Json(body): Json<StatusBody>,
) -> Result<Json<Node>, ApiError> {
  Ok(Json(engine.set_node_status(id, body.status).await?))
}

// ─── Derived views ────────────────────────────────────────────────────────────

/// `GET /nodes/:id/lambda-history`
pub async fn lambda_history<S: ValuationStore>(
  State(engine): State<Arc<Recomputer<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<LambdaChange>>, ApiError> {
  Ok(Json(engine.lambda_history(id).await?))
}

/// `GET /nodes/:id/snapshot`
pub async fn snapshot<S: ValuationStore>(
  State(engine): State<Arc<Recomputer<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ValuationSnapshot>, ApiError> {
  Ok(Json(engine.latest_snapshot(EntityKey::Node(id)).await?))
}

/// `POST /nodes/:id/recompute`
pub async fn recompute<S: ValuationStore>(
  State(engine): State<Arc<Recomputer<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ValuationSnapshot>, ApiError> {
  Ok(Json(engine.recompute_node(id).await?))
}
