//! The `ValuationStore` trait: the storage adapter the engine persists
//! through.
//!
//! The trait is implemented by storage backends (e.g. `rapport-store-sqlite`).
//! The recompute pipeline and the HTTP layer depend on this abstraction, not
//! on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  density::DensitySample,
  edge::{PairKey, RelationshipEdge},
  ledger::TimeActivity,
  node::{LambdaChange, Node},
  risk::{RiskRecord, RiskStatus},
  snapshot::{EntityKey, ValuationSnapshot},
};

/// Abstraction over a valuation store backend.
///
/// Writes are atomic: a failed call leaves previously stored rows untouched.
/// Snapshots, time activities, density samples and λ changes are append-only;
/// nodes, edges and risk records are replaced whole.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait ValuationStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Nodes ─────────────────────────────────────────────────────────────

  /// Persist a brand-new node. Fails if the id is taken.
  fn insert_node(
    &self,
    node: Node,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Replace a node's row and, in the same transaction, append its λ change
  /// when there is one.
  fn update_node(
    &self,
    node: Node,
    change: Option<LambdaChange>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Retrieve a node by id. Returns `None` if not found.
  fn get_node(
    &self,
    node_id: Uuid,
  ) -> impl Future<Output = Result<Option<Node>, Self::Error>> + Send + '_;

  /// List nodes, optionally restricted to one organisation.
  fn list_nodes(
    &self,
    org_id: Option<Uuid>,
  ) -> impl Future<Output = Result<Vec<Node>, Self::Error>> + Send + '_;

  /// λ history for a node, newest first.
  fn lambda_history(
    &self,
    node_id: Uuid,
  ) -> impl Future<Output = Result<Vec<LambdaChange>, Self::Error>> + Send + '_;

  // ── Edges and density ─────────────────────────────────────────────────

  /// Insert or replace the single edge for `edge.pair`.
  fn put_edge(
    &self,
    edge: RelationshipEdge,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_edge(
    &self,
    pair: PairKey,
  ) -> impl Future<Output = Result<Option<RelationshipEdge>, Self::Error>> + Send + '_;

  fn record_density(
    &self,
    sample: DensitySample,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The most recently measured sample for a pair.
  fn latest_density(
    &self,
    pair: PairKey,
  ) -> impl Future<Output = Result<Option<DensitySample>, Self::Error>> + Send + '_;

  // ── Time activities ───────────────────────────────────────────────────

  fn record_activity(
    &self,
    activity: TimeActivity,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Activities reported by `node_id`, optionally only those recorded at or
  /// after `since`.
  fn activities_for_node(
    &self,
    node_id: Uuid,
    since: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<Vec<TimeActivity>, Self::Error>> + Send + '_;

  /// Activities either member of `pair` reported with the other as
  /// counterpart.
  fn activities_for_pair(
    &self,
    pair: PairKey,
    since: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<Vec<TimeActivity>, Self::Error>> + Send + '_;

  // ── Snapshots ─────────────────────────────────────────────────────────

  /// Append a snapshot. Never mutates an existing one.
  fn save_snapshot(
    &self,
    snapshot: ValuationSnapshot,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The latest snapshot for an entity.
  fn load_latest(
    &self,
    entity: EntityKey,
  ) -> impl Future<Output = Result<Option<ValuationSnapshot>, Self::Error>> + Send + '_;

  /// The latest snapshot of every entity in an organisation.
  fn latest_snapshots(
    &self,
    org_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ValuationSnapshot>, Self::Error>> + Send + '_;

  // ── Risk records ──────────────────────────────────────────────────────

  /// Insert or replace a risk record, including its transition history.
  fn put_risk_record(
    &self,
    record: RiskRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_risk_record(
    &self,
    risk_id: Uuid,
  ) -> impl Future<Output = Result<Option<RiskRecord>, Self::Error>> + Send + '_;

  /// The not-yet-closed record for `target`, if any.
  fn active_risk_for(
    &self,
    target: EntityKey,
  ) -> impl Future<Output = Result<Option<RiskRecord>, Self::Error>> + Send + '_;

  /// List risk records, optionally filtered by status, most urgent first.
  fn list_risk_records(
    &self,
    status: Option<RiskStatus>,
  ) -> impl Future<Output = Result<Vec<RiskRecord>, Self::Error>> + Send + '_;
}
