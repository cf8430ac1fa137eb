//! The recompute-on-write pipeline.
//!
//! Every mutation (a factor update, a density sample, an interaction) is
//! persisted first and then followed by a recompute of the affected entity.
//! Recomputes for one [`EntityKey`] are serialised through [`KeyedLocks`];
//! the organisation rollup reads the latest snapshots without locking and may
//! therefore be slightly stale.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use rapport_core::{
  density::{DecayedDensity, DensitySample, NewDensitySample},
  edge::{EdgeFactorUpdate, PairKey, RelationshipEdge},
  ledger::{activity_drop, last_contact, weighted_time, Interaction, TimeActivity, TimeLedger},
  node::{LambdaChange, NewNode, Node, NodeFactorUpdate, NodeFactors, NodeStatus},
  risk::{RiskAction, RiskRecord, RiskStatus},
  sigma::{ObservedOutcome, SigmaStrategy},
  snapshot::{EntityKey, OrgRollup, ValuationSnapshot, ValueComponents},
  store::ValuationStore,
  valuation::{months_between, PairInputs},
  EngineConfig, Valuator,
};

use crate::{locks::KeyedLocks, Error, Result};

// ─── Outcomes ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct UpdatedNode {
  pub node:          Node,
  /// Present when the update changed any factor, even if λ held.
  pub lambda_change: Option<LambdaChange>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairRecompute {
  pub snapshot: ValuationSnapshot,
  /// A record opened by this recompute. `None` when the level was below the
  /// queue floor or a record was already active.
  pub queued:   Option<RiskRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
  pub activity: TimeActivity,
  pub node:     ValuationSnapshot,
  /// Absent when the interaction had no counterpart, or the pair has no edge
  /// or density sample yet.
  pub pair:     Option<PairRecompute>,
}

/// A density sample with idle decay applied at read time. Its
/// `last_interaction_at` includes the newest logged activity for the pair.
#[derive(Debug, Clone, Serialize)]
pub struct DensityReading {
  pub sample:  DensitySample,
  pub decayed: DecayedDensity,
}

// ─── Recomputer ──────────────────────────────────────────────────────────────

/// Drives the calculators against a [`ValuationStore`].
pub struct Recomputer<S> {
  store:    Arc<S>,
  valuator: Valuator,
  locks:    KeyedLocks,
}

impl<S: ValuationStore> Recomputer<S> {
  /// Fails with `InvalidConfig` before touching the store when `config` is
  /// invalid.
  pub fn new(store: Arc<S>, config: EngineConfig) -> Result<Self> {
    Ok(Self {
      store,
      valuator: Valuator::new(config)?,
      locks: KeyedLocks::default(),
    })
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn valuator(&self) -> &Valuator { &self.valuator }

  // ── Nodes ─────────────────────────────────────────────────────────────────

  pub async fn create_node(&self, new: NewNode) -> Result<Node> {
    let now = Utc::now();
    let factors = new.factors.apply(&NodeFactors::default());
    let node = Node {
      node_id: Uuid::new_v4(),
      org_id: new.org_id,
      role: new.role,
      status: NodeStatus::Active,
      lambda: self.valuator.lambda(&factors),
      factors,
      created_at: now,
      updated_at: now,
    };
    self.store.insert_node(node.clone()).await.map_err(Error::store)?;
    tracing::info!(node_id = %node.node_id, lambda = node.lambda, "node created");
    Ok(node)
  }

  pub async fn get_node(&self, node_id: Uuid) -> Result<Node> {
    self
      .store
      .get_node(node_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| rapport_core::Error::NodeNotFound(node_id).into())
  }

  pub async fn list_nodes(&self, org_id: Option<Uuid>) -> Result<Vec<Node>> {
    self.store.list_nodes(org_id).await.map_err(Error::store)
  }

  /// Overlay new factors, recompute λ and, when any factor changed, append
  /// the previous λ to the node's audit history in the same write.
  pub async fn apply_node_update(&self, update: NodeFactorUpdate) -> Result<UpdatedNode> {
    let _guard = self.locks.lock(EntityKey::Node(update.node_id)).await;

    let mut node = self.get_node(update.node_id).await?;
    let now = Utc::now();
    let previous = node.lambda;
    let factors = update.factors.apply(&node.factors);
    let factors_changed = factors != node.factors;

    node.factors = factors;
    node.lambda = self.valuator.lambda(&node.factors);
    node.updated_at = now;

    let lambda_change = factors_changed.then(|| LambdaChange {
      change_id: Uuid::new_v4(),
      node_id: node.node_id,
      previous,
      current: node.lambda,
      reason: update.reason.clone().unwrap_or_else(|| "factor update".to_owned()),
      changed_at: now,
    });

    self
      .store
      .update_node(node.clone(), lambda_change.clone())
      .await
      .map_err(Error::store)?;

    if let Some(change) = &lambda_change {
      tracing::info!(
        node_id = %node.node_id,
        previous = change.previous,
        current = change.current,
        reason = %change.reason,
        "lambda recomputed"
      );
    }

    self.recompute_node_locked(&node, now).await?;
    Ok(UpdatedNode { node, lambda_change })
  }

  /// Move a node between soft statuses. Nodes are never deleted.
  pub async fn set_node_status(&self, node_id: Uuid, status: NodeStatus) -> Result<Node> {
    let _guard = self.locks.lock(EntityKey::Node(node_id)).await;

    let mut node = self.get_node(node_id).await?;
    if node.status == status {
      return Ok(node);
    }
    let from = node.status;
    node.status = status;
    node.updated_at = Utc::now();
    self.store.update_node(node.clone(), None).await.map_err(Error::store)?;
    tracing::info!(node_id = %node_id, %from, to = %status, "node status changed");
    Ok(node)
  }

  /// λ history for a node, newest first.
  pub async fn lambda_history(&self, node_id: Uuid) -> Result<Vec<LambdaChange>> {
    self.get_node(node_id).await?;
    self.store.lambda_history(node_id).await.map_err(Error::store)
  }

  /// Recompute and save the node's net-time-value snapshot.
  pub async fn recompute_node(&self, node_id: Uuid) -> Result<ValuationSnapshot> {
    let _guard = self.locks.lock(EntityKey::Node(node_id)).await;
    let node = self.get_node(node_id).await?;
    self.recompute_node_locked(&node, Utc::now()).await
  }

  async fn recompute_node_locked(&self, node: &Node, now: DateTime<Utc>) -> Result<ValuationSnapshot> {
    let activities = self
      .store
      .activities_for_node(node.node_id, None)
      .await
      .map_err(Error::store)?;
    let ledger = TimeLedger::from_activities(&activities);
    let valuation = self.valuator.value_node(node.lambda, &ledger);

    let snapshot = ValuationSnapshot {
      snapshot_id: Uuid::new_v4(),
      entity: EntityKey::Node(node.node_id),
      org_id: node.org_id,
      value: valuation.value,
      monetary: valuation.monetary,
      components: valuation.components,
      health: valuation.health,
      risk_level: None,
      calculated_at: now,
    };
    self.save(snapshot).await
  }

  // ── Edges and density ─────────────────────────────────────────────────────

  pub async fn get_edge(&self, pair: PairKey) -> Result<RelationshipEdge> {
    self
      .store
      .get_edge(pair)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| rapport_core::Error::EdgeNotFound(pair).into())
  }

  /// Create or update the edge for a pair and recompute σ. Both nodes must
  /// already exist. The pair is revalued when a density sample is on file.
  pub async fn apply_edge_update(&self, update: EdgeFactorUpdate) -> Result<RelationshipEdge> {
    let pair = update.pair()?;
    let first = self.get_node(pair.first()).await?;
    self.get_node(pair.second()).await?;

    let _guard = self.locks.lock(EntityKey::Pair(pair)).await;

    let existing = self.store.get_edge(pair).await.map_err(Error::store)?;
    let now = Utc::now();
    let factors = update.apply(existing.as_ref().map(|e| &e.factors));
    let basis = update
      .basis
      .or(existing.as_ref().map(|e| e.basis))
      .unwrap_or_default();

    let mut edge = match existing {
      Some(edge) => edge,
      None => RelationshipEdge {
        pair,
        org_id: first.org_id,
        sigma: 0.0,
        strategy: self.strategy(),
        factors,
        basis,
        created_at: now,
        updated_at: now,
      },
    };
    edge.factors = factors;
    edge.basis = basis;
    edge.strategy = self.strategy();
    edge.sigma = self.sigma_for(&edge, None).await?;
    edge.updated_at = now;

    self.store.put_edge(edge.clone()).await.map_err(Error::store)?;
    tracing::debug!(%pair, sigma = edge.sigma, strategy = %edge.strategy, "edge updated");

    self.recompute_pair_if_ready(pair, now).await?;
    Ok(edge)
  }

  /// Record a density measurement for a pair and revalue it when an edge
  /// exists.
  pub async fn record_density(&self, new: NewDensitySample) -> Result<DensitySample> {
    let now = Utc::now();
    let sample = new.into_sample(&self.valuator.config().density, now)?;
    self.get_node(sample.pair.first()).await?;
    self.get_node(sample.pair.second()).await?;

    let _guard = self.locks.lock(EntityKey::Pair(sample.pair)).await;
    self.store.record_density(sample.clone()).await.map_err(Error::store)?;
    self.recompute_pair_if_ready(sample.pair, now).await?;
    Ok(sample)
  }

  /// The latest density sample with decay applied as of now.
  pub async fn current_density(&self, pair: PairKey) -> Result<DensityReading> {
    let activities = self
      .store
      .activities_for_pair(pair, None)
      .await
      .map_err(Error::store)?;
    let sample = self
      .store
      .latest_density(pair)
      .await
      .map_err(Error::store)?
      .ok_or(rapport_core::Error::DensityNotFound(pair))?
      .with_contact(last_contact(&activities));
    let decayed = sample.decayed(Utc::now());
    Ok(DensityReading { sample, decayed })
  }

  // ── Interactions ──────────────────────────────────────────────────────────

  /// Record time spent by `from_node`, stamped with its current λ, then
  /// revalue the node and, when there is a counterpart, the pair.
  pub async fn ingest_interaction(&self, interaction: Interaction) -> Result<IngestOutcome> {
    let from = self.get_node(interaction.from_node).await?;
    let pair = match interaction.to_node {
      Some(to) => {
        self.get_node(to).await?;
        Some(PairKey::new(from.node_id, to)?)
      }
      None => None,
    };

    let now = Utc::now();
    let activity = TimeActivity::from_interaction(&interaction, from.lambda, now);
    self
      .store
      .record_activity(activity.clone())
      .await
      .map_err(Error::store)?;
    tracing::debug!(
      node_id = %activity.node_id,
      nature = %activity.nature,
      stu = activity.stu_value(),
      "activity recorded"
    );

    let node = {
      let _guard = self.locks.lock(EntityKey::Node(from.node_id)).await;
      let node = self.get_node(from.node_id).await?;
      self.recompute_node_locked(&node, now).await?
    };

    let pair = match pair {
      Some(pair) => {
        let _guard = self.locks.lock(EntityKey::Pair(pair)).await;
        self.recompute_pair_if_ready(pair, now).await?
      }
      None => None,
    };

    Ok(IngestOutcome { activity, node, pair })
  }

  // ── Pair valuation ────────────────────────────────────────────────────────

  /// Revalue a pair. Fails with `EdgeNotFound` or `DensityNotFound` when
  /// either input is missing; the previous snapshot is left untouched.
  pub async fn recompute_pair(&self, pair: PairKey) -> Result<PairRecompute> {
    let _guard = self.locks.lock(EntityKey::Pair(pair)).await;
    let result = self.recompute_pair_locked(pair, Utc::now()).await;
    if let Err(e) = &result {
      tracing::warn!(%pair, error = %e, "pair recompute failed");
    }
    result
  }

  async fn recompute_pair_if_ready(
    &self,
    pair: PairKey,
    now: DateTime<Utc>,
  ) -> Result<Option<PairRecompute>> {
    match self.recompute_pair_locked(pair, now).await {
      Ok(done) => Ok(Some(done)),
      Err(e) if e.is_not_found() => {
        tracing::debug!(%pair, reason = %e, "pair not ready for valuation");
        Ok(None)
      }
      Err(e) => {
        tracing::warn!(%pair, error = %e, "pair recompute failed");
        Err(e)
      }
    }
  }

  async fn recompute_pair_locked(&self, pair: PairKey, now: DateTime<Utc>) -> Result<PairRecompute> {
    let mut edge = self.get_edge(pair).await?;
    let activities = self
      .store
      .activities_for_pair(pair, None)
      .await
      .map_err(Error::store)?;
    let density = self
      .store
      .latest_density(pair)
      .await
      .map_err(Error::store)?
      .ok_or(rapport_core::Error::DensityNotFound(pair))?
      .with_contact(last_contact(&activities));

    let weighted = weighted_time(&activities);
    let window = self.valuator.config().activity_window_days;

    let sigma = self.sigma_for(&edge, Some(weighted)).await?;
    if (sigma - edge.sigma).abs() > f64::EPSILON || edge.strategy != self.strategy() {
      edge.sigma = sigma;
      edge.strategy = self.strategy();
      edge.updated_at = now;
      self.store.put_edge(edge.clone()).await.map_err(Error::store)?;
    }

    let valuation = self.valuator.value_pair(&PairInputs {
      sigma,
      density: density.decayed(now),
      weighted_time: weighted,
      elapsed_months: months_between(edge.created_at, now),
      activity_drop: activity_drop(&activities, now, window),
    });

    let churn = match valuation.components {
      ValueComponents::Pair { churn_probability, .. } => churn_probability,
      ValueComponents::Node { .. } => 0.0,
    };
    let level = valuation.classification.level;
    let key = EntityKey::Pair(pair);

    let snapshot = self
      .save(ValuationSnapshot {
        snapshot_id: Uuid::new_v4(),
        entity: key,
        org_id: edge.org_id,
        value: valuation.value,
        monetary: valuation.monetary,
        components: valuation.components,
        health: valuation.health,
        risk_level: Some(level),
        calculated_at: now,
      })
      .await?;

    let mut queued = None;
    if level >= self.valuator.config().risk.queue_floor
      && self
        .store
        .active_risk_for(key)
        .await
        .map_err(Error::store)?
        .is_none()
    {
      let record = RiskRecord::open(key, edge.org_id, churn, valuation.classification, now);
      self.store.put_risk_record(record.clone()).await.map_err(Error::store)?;
      tracing::info!(
        risk_id = %record.risk_id,
        %pair,
        level = %record.level,
        days_to_action = record.days_to_action,
        "risk queued"
      );
      queued = Some(record);
    }

    self.locks.prune_idle();
    Ok(PairRecompute { snapshot, queued })
  }

  fn strategy(&self) -> SigmaStrategy { self.valuator.config().sigma.strategy }

  /// σ for an edge under the configured strategy. The `inverse` strategy
  /// reads the pair's last observed value; `weighted_time` overrides the Λ
  /// recorded with it.
  async fn sigma_for(&self, edge: &RelationshipEdge, weighted_time: Option<f64>) -> Result<f64> {
    let observed = match self.strategy() {
      SigmaStrategy::Inverse => self
        .store
        .load_latest(EntityKey::Pair(edge.pair))
        .await
        .map_err(Error::store)?
        .and_then(|snapshot| match snapshot.components {
          ValueComponents::Pair { weighted_time: recorded, .. } => Some(ObservedOutcome {
            value:         snapshot.value,
            weighted_time: weighted_time.unwrap_or(recorded),
          }),
          ValueComponents::Node { .. } => None,
        }),
      SigmaStrategy::Weighted | SigmaStrategy::Rescaled => None,
    };
    Ok(self.valuator.sigma(&edge.factors, observed))
  }

  // ── Snapshots and rollups ─────────────────────────────────────────────────

  async fn save(&self, snapshot: ValuationSnapshot) -> Result<ValuationSnapshot> {
    self
      .store
      .save_snapshot(snapshot.clone())
      .await
      .map_err(Error::store)?;
    tracing::info!(
      entity = %snapshot.entity,
      value = snapshot.value,
      health = %snapshot.health,
      "snapshot saved"
    );
    Ok(snapshot)
  }

  pub async fn latest_snapshot(&self, entity: EntityKey) -> Result<ValuationSnapshot> {
    self
      .store
      .load_latest(entity)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| rapport_core::Error::SnapshotNotFound(entity).into())
  }

  /// Organisation totals from the latest snapshot of each entity. Reads are
  /// unlocked; a concurrent recompute may or may not be reflected.
  pub async fn rollup(&self, org_id: Uuid) -> Result<OrgRollup> {
    let snapshots = self
      .store
      .latest_snapshots(org_id)
      .await
      .map_err(Error::store)?;
    Ok(OrgRollup::from_snapshots(
      org_id,
      &snapshots,
      self.valuator.config().omega,
      Utc::now(),
    ))
  }

  // ── Risk records ──────────────────────────────────────────────────────────

  pub async fn get_risk(&self, risk_id: Uuid) -> Result<RiskRecord> {
    self
      .store
      .get_risk_record(risk_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| rapport_core::Error::RiskRecordNotFound(risk_id).into())
  }

  pub async fn list_risks(&self, status: Option<RiskStatus>) -> Result<Vec<RiskRecord>> {
    self.store.list_risk_records(status).await.map_err(Error::store)
  }

  /// Apply a workflow action. Invalid transitions leave the stored record
  /// unchanged.
  pub async fn transition_risk(&self, risk_id: Uuid, action: RiskAction) -> Result<RiskRecord> {
    let target = self.get_risk(risk_id).await?.target;
    let _guard = self.locks.lock(target).await;

    let mut record = self.get_risk(risk_id).await?;
    let from = record.status;
    let verb = action.to_string();
    record.apply(action, &self.valuator.config().risk.bands, Utc::now())?;
    self
      .store
      .put_risk_record(record.clone())
      .await
      .map_err(Error::store)?;
    tracing::info!(%risk_id, %from, to = %record.status, action = %verb, "risk transitioned");
    Ok(record)
  }
}
