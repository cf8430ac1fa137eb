//! Handlers for relationship edges, density samples and pair valuations.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/edges` | Body: edge factor update; creates the edge if absent |
//! | `POST` | `/density` | Body: density sample |
//! | `GET`  | `/pairs/:a/:b` | The edge; order of `a` and `b` is irrelevant |
//! | `GET`  | `/pairs/:a/:b/density` | Latest sample, decayed as of now |
//! | `GET`  | `/pairs/:a/:b/snapshot` | Latest pair snapshot |
//! | `POST` | `/pairs/:a/:b/recompute` | Writes a fresh snapshot, may queue a risk |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use rapport_core::{
  density::NewDensitySample,
  edge::{EdgeFactorUpdate, PairKey, RelationshipEdge},
  snapshot::{EntityKey, ValuationSnapshot},
  store::ValuationStore,
};
use rapport_engine::{DensityReading, PairRecompute, Recomputer};
use uuid::Uuid;

use crate::error::ApiError;

fn pair_key((a, b): (Uuid, Uuid)) -> Result<PairKey, ApiError> {
  Ok(PairKey::new(a, b)?)
}

// ─── Writes ───────────────────────────────────────────────────────────────────

/// `POST /edges`
pub async fn update_edge<S: ValuationStore>(
  State(engine): State<Arc<Recomputer<S>>>,
  Json(body): Json<EdgeFactorUpdate>,
) -> Result<Json<RelationshipEdge>, ApiError> {
  Ok(Json(engine.apply_edge_update(body).await?))
}

/// `POST /density`
pub async fn record_density<S: ValuationStore>(
  State(engine): State<Arc<Recomputer<S>>>,
  Json(body): Json<NewDensitySample>,
) -> Result<impl IntoResponse, ApiError> {
  let sample = engine.record_density(body).await?;
  Ok((StatusCode::CREATED, Json(sample)))
}

// ─── Reads ────────────────────────────────────────────────────────────────────

/// `GET /pairs/:a/:b`
pub async fn get_edge<S: ValuationStore>(
  State(engine): State<Arc<Recomputer<S>>>,
  Path(ids): Path<(Uuid, Uuid)>,
) -> Result<Json<RelationshipEdge>, ApiError> {
  Ok(Json(engine.get_edge(pair_key(ids)?).await?))
}

/// `GET /pairs/:a/:b/density`
pub async fn density<S: ValuationStore>(
  State(engine): State<Arc<Recomputer<S>>>,
  Path(ids): Path<(Uuid, Uuid)>,
) -> Result<Json<DensityReading>, ApiError> {
  Ok(Json(engine.current_density(pair_key(ids)?).await?))
}

/// `GET /pairs/:a/:b/snapshot`
pub async fn snapshot<S: ValuationStore>(
  State(engine): State<Arc<Recomputer<S>>>,
  Path(ids): Path<(Uuid, Uuid)>,
) -> Result<Json<ValuationSnapshot>, ApiError> {
  let pair = pair_key(ids)?;
  Ok(Json(engine.latest_snapshot(EntityKey::Pair(pair)).await?))
}

/// `POST /pairs/:a/:b/recompute`
pub async fn recompute<S: ValuationStore>(
  State(engine): State<Arc<Recomputer<S>>>,
  Path(ids): Path<(Uuid, Uuid)>,
) -> Result<Json<PairRecompute>, ApiError> {
  Ok(Json(engine.recompute_pair(pair_key(ids)?).await?))
}
