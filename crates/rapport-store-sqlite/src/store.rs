//! [`SqliteStore`]: the SQLite implementation of [`ValuationStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use rapport_core::{
  density::DensitySample,
  edge::{PairKey, RelationshipEdge},
  ledger::TimeActivity,
  node::{LambdaChange, Node},
  risk::{RiskRecord, RiskStatus},
  snapshot::{EntityKey, ValuationSnapshot},
  store::ValuationStore,
};

use crate::{
  encode::{
    encode_dt, encode_text, encode_uuid, RawActivity, RawDensity, RawEdge, RawLambdaChange,
    RawNode, RawRiskRecord, RawSnapshot,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A valuation store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run an activity query with an optional `since` bound appended.
  async fn query_activities(
    &self,
    filter: &'static str,
    ids: [String; 2],
    since: Option<DateTime<Utc>>,
  ) -> Result<Vec<TimeActivity>> {
    let since_str = since.map(encode_dt);

    let raws: Vec<RawActivity> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM time_activities
           WHERE ({filter}) AND (?3 IS NULL OR recorded_at >= ?3)
           ORDER BY recorded_at ASC",
          RawActivity::COLUMNS,
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![ids[0], ids[1], since_str],
            RawActivity::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawActivity::into_activity).collect()
  }
}

// ─── ValuationStore impl ─────────────────────────────────────────────────────

impl ValuationStore for SqliteStore {
  type Error = Error;

  // ── Nodes ─────────────────────────────────────────────────────────────────

  async fn insert_node(&self, node: Node) -> Result<()> {
    let node_id      = node.node_id;
    let id_str       = encode_uuid(node.node_id);
    let org_str      = encode_uuid(node.org_id);
    let status_str   = encode_text(node.status);
    let factors_json = serde_json::to_string(&node.factors)?;
    let created_str  = encode_dt(node.created_at);
    let updated_str  = encode_dt(node.updated_at);
    let role         = node.role;
    let lambda       = node.lambda;

    let inserted = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "INSERT OR IGNORE INTO nodes (
             node_id, org_id, role, status, factors_json, lambda, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            id_str,
            org_str,
            role,
            status_str,
            factors_json,
            lambda,
            created_str,
            updated_str,
          ],
        )?;
        Ok(n)
      })
      .await?;

    if inserted == 0 {
      return Err(Error::NodeExists(node_id));
    }
    Ok(())
  }

  async fn update_node(&self, node: Node, change: Option<LambdaChange>) -> Result<()> {
    let node_id      = node.node_id;
    let id_str       = encode_uuid(node.node_id);
    let status_str   = encode_text(node.status);
    let factors_json = serde_json::to_string(&node.factors)?;
    let updated_str  = encode_dt(node.updated_at);
    let role         = node.role;
    let lambda       = node.lambda;
    let change_row   = change.map(|c| {
      (
        encode_uuid(c.change_id),
        encode_uuid(c.node_id),
        c.previous,
        c.current,
        c.reason,
        encode_dt(c.changed_at),
      )
    });

    let updated = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let n = tx.execute(
          "UPDATE nodes
           SET role = ?2, status = ?3, factors_json = ?4, lambda = ?5, updated_at = ?6
           WHERE node_id = ?1",
          rusqlite::params![id_str, role, status_str, factors_json, lambda, updated_str],
        )?;
        if n == 0 {
          // Nothing to attach an audit row to; roll back by dropping `tx`.
          return Ok(0);
        }
        if let Some((change_id, node_id, previous, current, reason, changed_at)) = change_row {
          tx.execute(
            "INSERT INTO lambda_changes (
               change_id, node_id, previous_lambda, current_lambda, reason, changed_at
             )
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![change_id, node_id, previous, current, reason, changed_at],
          )?;
        }
        tx.commit()?;
        Ok(n)
      })
      .await?;

    if updated == 0 {
      return Err(rapport_core::Error::NodeNotFound(node_id).into());
    }
    Ok(())
  }

  async fn get_node(&self, node_id: Uuid) -> Result<Option<Node>> {
    let id_str = encode_uuid(node_id);

    let raw: Option<RawNode> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {} FROM nodes WHERE node_id = ?1", RawNode::COLUMNS),
            rusqlite::params![id_str],
            RawNode::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawNode::into_node).transpose()
  }

  async fn list_nodes(&self, org_id: Option<Uuid>) -> Result<Vec<Node>> {
    let org_str = org_id.map(encode_uuid);

    let raws: Vec<RawNode> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM nodes WHERE (?1 IS NULL OR org_id = ?1) ORDER BY created_at ASC",
          RawNode::COLUMNS,
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![org_str], RawNode::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawNode::into_node).collect()
  }

  async fn lambda_history(&self, node_id: Uuid) -> Result<Vec<LambdaChange>> {
    let id_str = encode_uuid(node_id);

    let raws: Vec<RawLambdaChange> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT change_id, node_id, previous_lambda, current_lambda, reason, changed_at
           FROM lambda_changes
           WHERE node_id = ?1
           ORDER BY changed_at DESC, rowid DESC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawLambdaChange::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawLambdaChange::into_change).collect()
  }

  // ── Edges and density ─────────────────────────────────────────────────────

  async fn put_edge(&self, edge: RelationshipEdge) -> Result<()> {
    let pair_str     = encode_text(edge.pair);
    let a_str        = encode_uuid(edge.pair.first());
    let b_str        = encode_uuid(edge.pair.second());
    let org_str      = encode_uuid(edge.org_id);
    let strategy_str = encode_text(edge.strategy);
    let factors_json = serde_json::to_string(&edge.factors)?;
    let basis_str    = encode_text(edge.basis);
    let created_str  = encode_dt(edge.created_at);
    let updated_str  = encode_dt(edge.updated_at);
    let sigma        = edge.sigma;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO edges (
             pair_key, node_a, node_b, org_id, sigma, strategy,
             factors_json, basis, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            pair_str,
            a_str,
            b_str,
            org_str,
            sigma,
            strategy_str,
            factors_json,
            basis_str,
            created_str,
            updated_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_edge(&self, pair: PairKey) -> Result<Option<RelationshipEdge>> {
    let pair_str = encode_text(pair);

    let raw: Option<RawEdge> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {} FROM edges WHERE pair_key = ?1", RawEdge::COLUMNS),
            rusqlite::params![pair_str],
            RawEdge::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawEdge::into_edge).transpose()
  }

  async fn record_density(&self, sample: DensitySample) -> Result<()> {
    let id_str       = encode_uuid(sample.sample_id);
    let pair_str     = encode_text(sample.pair);
    let last_str     = encode_dt(sample.last_interaction_at);
    let measured_str = encode_dt(sample.measured_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO density_samples (
             sample_id, pair_key, frequency, depth, quality, density,
             decay_rate, last_interaction_at, measured_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            id_str,
            pair_str,
            sample.frequency,
            sample.depth,
            sample.quality,
            sample.density,
            sample.decay_rate,
            last_str,
            measured_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn latest_density(&self, pair: PairKey) -> Result<Option<DensitySample>> {
    let pair_str = encode_text(pair);

    let raw: Option<RawDensity> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT sample_id, pair_key, frequency, depth, quality, density,
                    decay_rate, last_interaction_at, measured_at
             FROM density_samples
             WHERE pair_key = ?1
             ORDER BY measured_at DESC, rowid DESC
             LIMIT 1",
            rusqlite::params![pair_str],
            RawDensity::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawDensity::into_sample).transpose()
  }

  // ── Time activities ───────────────────────────────────────────────────────

  async fn record_activity(&self, activity: TimeActivity) -> Result<()> {
    let id_str      = encode_uuid(activity.activity_id);
    let node_str    = encode_uuid(activity.node_id);
    let counter_str = activity.counterpart_id.map(encode_uuid);
    let nature_str  = encode_text(activity.nature);
    let at_str      = encode_dt(activity.recorded_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO time_activities (
             activity_id, node_id, counterpart_id, nature,
             real_minutes, lambda_at_time, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            id_str,
            node_str,
            counter_str,
            nature_str,
            activity.real_minutes,
            activity.lambda_at_time,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn activities_for_node(
    &self,
    node_id: Uuid,
    since:   Option<DateTime<Utc>>,
  ) -> Result<Vec<TimeActivity>> {
    let id_str = encode_uuid(node_id);
    self
      .query_activities("node_id = ?1 OR node_id = ?2", [id_str.clone(), id_str], since)
      .await
  }

  async fn activities_for_pair(
    &self,
    pair:  PairKey,
    since: Option<DateTime<Utc>>,
  ) -> Result<Vec<TimeActivity>> {
    self
      .query_activities(
        "(node_id = ?1 AND counterpart_id = ?2) OR (node_id = ?2 AND counterpart_id = ?1)",
        [encode_uuid(pair.first()), encode_uuid(pair.second())],
        since,
      )
      .await
  }

  // ── Snapshots ─────────────────────────────────────────────────────────────

  async fn save_snapshot(&self, snapshot: ValuationSnapshot) -> Result<()> {
    let id_str          = encode_uuid(snapshot.snapshot_id);
    let entity_str      = encode_text(snapshot.entity);
    let org_str         = encode_uuid(snapshot.org_id);
    let components_json = serde_json::to_string(&snapshot.components)?;
    let health_str      = encode_text(snapshot.health);
    let risk_str        = snapshot.risk_level.map(encode_text);
    let at_str          = encode_dt(snapshot.calculated_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO snapshots (
             snapshot_id, entity_key, org_id, value, monetary,
             components_json, health, risk_level, calculated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            id_str,
            entity_str,
            org_str,
            snapshot.value,
            snapshot.monetary,
            components_json,
            health_str,
            risk_str,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn load_latest(&self, entity: EntityKey) -> Result<Option<ValuationSnapshot>> {
    let entity_str = encode_text(entity);

    let raw: Option<RawSnapshot> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {} FROM snapshots
               WHERE entity_key = ?1
               ORDER BY calculated_at DESC, rowid DESC
               LIMIT 1",
              RawSnapshot::COLUMNS,
            ),
            rusqlite::params![entity_str],
            RawSnapshot::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawSnapshot::into_snapshot).transpose()
  }

  async fn latest_snapshots(&self, org_id: Uuid) -> Result<Vec<ValuationSnapshot>> {
    let org_str = encode_uuid(org_id);

    let raws: Vec<RawSnapshot> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM snapshots s
           WHERE s.org_id = ?1
             AND s.rowid = (
               SELECT s2.rowid FROM snapshots s2
               WHERE s2.entity_key = s.entity_key
               ORDER BY s2.calculated_at DESC, s2.rowid DESC
               LIMIT 1
             )
           ORDER BY s.entity_key",
          RawSnapshot::COLUMNS,
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![org_str], RawSnapshot::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSnapshot::into_snapshot).collect()
  }

  // ── Risk records ──────────────────────────────────────────────────────────

  async fn put_risk_record(&self, record: RiskRecord) -> Result<()> {
    let id_str       = encode_uuid(record.risk_id);
    let target_str   = encode_text(record.target);
    let org_str      = encode_uuid(record.org_id);
    let level_str    = encode_text(record.level);
    let status_str   = encode_text(record.status);
    let history_json = serde_json::to_string(&record.history)?;
    let created_str  = encode_dt(record.created_at);
    let updated_str  = encode_dt(record.updated_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO risk_records (
             risk_id, target_key, org_id, score, level, days_to_action,
             recommendation, status, assignee, resolution_note,
             history_json, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
          rusqlite::params![
            id_str,
            target_str,
            org_str,
            record.score,
            level_str,
            record.days_to_action,
            record.recommendation,
            status_str,
            record.assignee,
            record.resolution_note,
            history_json,
            created_str,
            updated_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_risk_record(&self, risk_id: Uuid) -> Result<Option<RiskRecord>> {
    let id_str = encode_uuid(risk_id);

    let raw: Option<RawRiskRecord> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {} FROM risk_records WHERE risk_id = ?1", RawRiskRecord::COLUMNS),
            rusqlite::params![id_str],
            RawRiskRecord::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawRiskRecord::into_record).transpose()
  }

  async fn active_risk_for(&self, target: EntityKey) -> Result<Option<RiskRecord>> {
    let target_str    = encode_text(target);
    let resolved_str  = encode_text(RiskStatus::Resolved);
    let dismissed_str = encode_text(RiskStatus::Dismissed);

    let raw: Option<RawRiskRecord> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {} FROM risk_records
               WHERE target_key = ?1 AND status NOT IN (?2, ?3)
               ORDER BY created_at DESC
               LIMIT 1",
              RawRiskRecord::COLUMNS,
            ),
            rusqlite::params![target_str, resolved_str, dismissed_str],
            RawRiskRecord::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawRiskRecord::into_record).transpose()
  }

  async fn list_risk_records(&self, status: Option<RiskStatus>) -> Result<Vec<RiskRecord>> {
    let status_str = status.map(encode_text);

    let raws: Vec<RawRiskRecord> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM risk_records
           WHERE (?1 IS NULL OR status = ?1)
           ORDER BY days_to_action ASC, created_at ASC",
          RawRiskRecord::COLUMNS,
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![status_str], RawRiskRecord::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRiskRecord::into_record).collect()
  }
}
