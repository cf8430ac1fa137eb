//! End-to-end pipeline tests against the in-memory SQLite store.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rapport_core::{
  density::NewDensitySample,
  edge::{EdgeFactorUpdate, PairKey},
  ledger::{Interaction, TimeNature},
  node::{FactorPatch, NewNode, Node, NodeFactorUpdate, NodeStatus},
  risk::{RiskAction, RiskLevel, RiskStatus},
  sigma::{SigmaConfig, SigmaStrategy, NEUTRAL_INVERSE_SIGMA},
  snapshot::{EntityKey, HealthStatus, ValueComponents},
  valuation::ValueComposition,
  EngineConfig,
};
use rapport_engine::{Error, Recomputer};
use rapport_store_sqlite::SqliteStore;
use uuid::Uuid;

async fn engine_with(config: EngineConfig) -> Recomputer<SqliteStore> {
  let store = SqliteStore::open_in_memory()
    .await
    .expect("in-memory store");
  Recomputer::new(Arc::new(store), config).expect("valid config")
}

async fn engine() -> Recomputer<SqliteStore> { engine_with(EngineConfig::default()).await }

async fn node(engine: &Recomputer<SqliteStore>, org_id: Uuid) -> Node {
  engine
    .create_node(NewNode {
      org_id,
      role:    "analyst".into(),
      factors: FactorPatch::default(),
    })
    .await
    .unwrap()
}

fn edge_update(a: Uuid, b: Uuid, factor: f64) -> EdgeFactorUpdate {
  EdgeFactorUpdate {
    node_a:         a,
    node_b:         b,
    compatibility:  Some(factor),
    goal_alignment: Some(factor),
    value_match:    Some(factor),
    rhythm_sync:    Some(factor),
    basis:          None,
  }
}

fn density(a: Uuid, b: Uuid, level: f64) -> NewDensitySample {
  NewDensitySample {
    node_a:              a,
    node_b:              b,
    frequency:           Some(level),
    depth:               Some(level),
    quality:             Some(level),
    decay_rate:          None,
    last_interaction_at: Utc::now(),
  }
}

fn hour_with(from: Uuid, to: Uuid) -> Interaction {
  Interaction {
    from_node:     from,
    to_node:       Some(to),
    real_minutes:  60.0,
    activity_type: TimeNature::Invested,
    timestamp:     None,
  }
}

/// Two nodes in one org with an edge and a density sample on file.
async fn ready_pair(
  engine: &Recomputer<SqliteStore>,
  factor: f64,
) -> (Uuid, PairKey, Node, Node) {
  let org = Uuid::new_v4();
  let a = node(engine, org).await;
  let b = node(engine, org).await;
  engine.apply_edge_update(edge_update(a.node_id, b.node_id, factor)).await.unwrap();
  engine.record_density(density(a.node_id, b.node_id, 0.8)).await.unwrap();
  let pair = PairKey::new(a.node_id, b.node_id).unwrap();
  (org, pair, a, b)
}

// ─── Nodes ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn new_node_lambda_is_floored() {
  let engine = engine().await;
  let created = engine
    .create_node(NewNode {
      org_id:  Uuid::new_v4(),
      role:    "lead".into(),
      factors: FactorPatch {
        replaceability: Some(0.2),
        influence:      Some(0.8),
        expertise:      Some(0.7),
        network:        Some(0.6),
      },
    })
    .await
    .unwrap();
  assert_eq!(created.lambda, 1.0);
  assert_eq!(created.status, NodeStatus::Active);
}

#[tokio::test]
async fn factor_update_records_lambda_change() {
  let engine = engine().await;
  let n = node(&engine, Uuid::new_v4()).await;

  let patch = FactorPatch {
    replaceability: Some(0.1),
    influence:      Some(1.0),
    expertise:      Some(1.0),
    network:        Some(1.0),
  };
  let updated = engine
    .apply_node_update(NodeFactorUpdate {
      node_id: n.node_id,
      factors: patch,
      reason:  Some("promotion".into()),
    })
    .await
    .unwrap();
  assert!((updated.node.lambda - 3.0).abs() < 1e-9);
  let change = updated.lambda_change.expect("lambda moved");
  assert_eq!(change.previous, 1.0);

  // Same factors again: nothing changed, nothing is appended.
  let again = engine
    .apply_node_update(NodeFactorUpdate { node_id: n.node_id, factors: patch, reason: None })
    .await
    .unwrap();
  assert!(again.lambda_change.is_none());

  let history = engine.lambda_history(n.node_id).await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].reason, "promotion");
}

#[tokio::test]
async fn factor_change_is_audited_even_when_lambda_holds() {
  let engine = engine().await;
  let n = node(&engine, Uuid::new_v4()).await;
  assert_eq!(n.lambda, 1.0);

  let updated = engine
    .apply_node_update(NodeFactorUpdate {
      node_id: n.node_id,
      factors: FactorPatch { influence: Some(0.9), ..FactorPatch::default() },
      reason:  Some("promotion".into()),
    })
    .await
    .unwrap();
  assert_eq!(updated.node.lambda, 1.0);
  assert_eq!(updated.node.factors.influence, 0.9);

  let change = updated.lambda_change.expect("factor changed");
  assert_eq!(change.previous, 1.0);
  assert_eq!(change.current, 1.0);

  let history = engine.lambda_history(n.node_id).await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].reason, "promotion");
}

#[tokio::test]
async fn unknown_node_is_not_found() {
  let engine = engine().await;
  let ghost = Uuid::new_v4();

  let err = engine
    .apply_node_update(NodeFactorUpdate {
      node_id: ghost,
      factors: FactorPatch::default(),
      reason:  None,
    })
    .await
    .unwrap_err();
  assert!(err.is_not_found());

  let real = node(&engine, Uuid::new_v4()).await;
  let err = engine
    .apply_edge_update(edge_update(real.node_id, ghost, 0.5))
    .await
    .unwrap_err();
  assert!(err.is_not_found());
  let pair = PairKey::new(real.node_id, ghost).unwrap();
  assert!(engine.get_edge(pair).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn status_changes_keep_the_node() {
  let engine = engine().await;
  let n = node(&engine, Uuid::new_v4()).await;
  engine.set_node_status(n.node_id, NodeStatus::Churned).await.unwrap();

  let fetched = engine.get_node(n.node_id).await.unwrap();
  assert_eq!(fetched.status, NodeStatus::Churned);
  assert_eq!(fetched.lambda, n.lambda);
}

// ─── Pair valuation ──────────────────────────────────────────────────────────

#[tokio::test]
async fn interaction_revalues_pair_and_node() {
  let engine = engine().await;
  let (_, pair, a, b) = ready_pair(&engine, 0.7).await;

  let outcome = engine.ingest_interaction(hour_with(a.node_id, b.node_id)).await.unwrap();
  assert_eq!(outcome.activity.lambda_at_time, a.lambda);

  let recompute = outcome.pair.expect("edge and density present");
  // P = 0.8 × 0.8, Λ = 1 STU, t ≈ 0 so the multiplier is ≈ 1.
  assert!((recompute.snapshot.value - 0.64).abs() < 1e-3);
  assert_eq!(recompute.snapshot.risk_level, Some(RiskLevel::Minimal));
  assert_eq!(recompute.snapshot.health, HealthStatus::Thriving);
  assert!(recompute.queued.is_none());

  let latest = engine.latest_snapshot(EntityKey::Pair(pair)).await.unwrap();
  assert_eq!(latest.snapshot_id, recompute.snapshot.snapshot_id);

  // One invested hour and nothing back: NTV = −1 STU.
  assert_eq!(outcome.node.value, -1.0);
  assert!(matches!(outcome.node.components, ValueComponents::Node { invested, .. } if invested == 1.0));
}

#[tokio::test]
async fn interaction_resets_pair_idle_time() {
  let engine = engine().await;
  let org = Uuid::new_v4();
  let a = node(&engine, org).await;
  let b = node(&engine, org).await;
  engine.apply_edge_update(edge_update(a.node_id, b.node_id, 0.7)).await.unwrap();
  let mut sample = density(a.node_id, b.node_id, 0.8);
  sample.last_interaction_at = Utc::now() - Duration::days(200);
  engine.record_density(sample).await.unwrap();

  let pair = PairKey::new(a.node_id, b.node_id).unwrap();
  let stale = engine.current_density(pair).await.unwrap();
  assert!(stale.decayed.idle_days > 199.0);
  assert!(stale.decayed.value < 0.02);

  let mut talk = hour_with(a.node_id, b.node_id);
  talk.real_minutes = 120.0;
  let outcome = engine.ingest_interaction(talk).await.unwrap();
  let snapshot = outcome.pair.expect("edge and density present").snapshot;
  let ValueComponents::Pair { idle_days, density, decayed_density, .. } = snapshot.components else {
    panic!("pair snapshot expected");
  };
  assert!(idle_days < 0.01);
  assert!((decayed_density - density).abs() < 1e-6);

  // The stored measurement is untouched; reads see the fresh contact.
  let fresh = engine.current_density(pair).await.unwrap();
  assert!(fresh.decayed.idle_days < 0.01);
  assert_eq!(fresh.sample.density, stale.sample.density);
}

#[tokio::test]
async fn pair_without_density_is_not_valued() {
  let engine = engine().await;
  let org = Uuid::new_v4();
  let a = node(&engine, org).await;
  let b = node(&engine, org).await;
  engine.apply_edge_update(edge_update(a.node_id, b.node_id, 0.5)).await.unwrap();

  let outcome = engine.ingest_interaction(hour_with(a.node_id, b.node_id)).await.unwrap();
  assert!(outcome.pair.is_none());

  let pair = PairKey::new(a.node_id, b.node_id).unwrap();
  let err = engine.recompute_pair(pair).await.unwrap_err();
  assert!(matches!(err, Error::Core(rapport_core::Error::DensityNotFound(p)) if p == pair));
  assert!(engine.latest_snapshot(EntityKey::Pair(pair)).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn power_law_composition_is_selectable() {
  let config = EngineConfig { composition: ValueComposition::PowerLaw, ..Default::default() };
  let engine = engine_with(config).await;
  let (_, _, a, b) = ready_pair(&engine, 0.7).await;

  for _ in 0..4 {
    engine.ingest_interaction(hour_with(a.node_id, b.node_id)).await.unwrap();
  }
  let pair = engine.ingest_interaction(hour_with(b.node_id, a.node_id)).await.unwrap().pair.unwrap();

  // T = 5 STU, σ = 0.7 lies inside the power-law range.
  assert!((pair.snapshot.value - 5.0f64.powf(0.7)).abs() < 1e-9);
  assert!(matches!(pair.snapshot.components, ValueComponents::Pair { multiplier: None, .. }));
}

#[tokio::test]
async fn inverse_sigma_reads_the_last_observed_value() {
  let config = EngineConfig {
    composition: ValueComposition::PowerLaw,
    sigma: SigmaConfig { strategy: SigmaStrategy::Inverse, ..Default::default() },
    ..Default::default()
  };
  let engine = engine_with(config).await;
  let org = Uuid::new_v4();
  let a = node(&engine, org).await;
  let b = node(&engine, org).await;
  let pair = PairKey::new(a.node_id, b.node_id).unwrap();

  // Nothing observed yet: σ is neutral whatever the factors say.
  let edge = engine.apply_edge_update(edge_update(a.node_id, b.node_id, -0.8)).await.unwrap();
  assert_eq!(edge.sigma, NEUTRAL_INVERSE_SIGMA);
  assert_eq!(edge.strategy, SigmaStrategy::Inverse);

  let mut ten_hours = hour_with(a.node_id, b.node_id);
  ten_hours.real_minutes = 600.0;
  assert!(engine.ingest_interaction(ten_hours).await.unwrap().pair.is_none());

  // First valuation: Λ = 10 STU, σ = 1, so V = 10.
  engine.record_density(density(a.node_id, b.node_id, 0.8)).await.unwrap();
  let first = engine.latest_snapshot(EntityKey::Pair(pair)).await.unwrap();
  assert!((first.value - 10.0).abs() < 1e-9);

  // Λ grows to 29 STU; σ is recovered from the previous V against the new Λ.
  let mut nineteen_hours = hour_with(b.node_id, a.node_id);
  nineteen_hours.real_minutes = 1140.0;
  let second = engine.ingest_interaction(nineteen_hours).await.unwrap().pair.unwrap();
  let expected = 10.0f64.ln() / 29.0f64.ln();
  let ValueComponents::Pair { sigma, weighted_time, .. } = second.snapshot.components else {
    panic!("pair snapshot expected");
  };
  assert!((weighted_time - 29.0).abs() < 1e-9);
  assert!((sigma - expected).abs() < 1e-9);
  assert!((engine.get_edge(pair).await.unwrap().sigma - expected).abs() < 1e-9);
}

// ─── Risk ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_ingest_queues_one_risk_record() {
  let engine = Arc::new(engine().await);
  let (_, pair, a, b) = ready_pair(&engine, -1.0).await;

  let tasks: Vec<_> = (0..16)
    .map(|i| {
      let engine = engine.clone();
      let (from, to) = if i % 2 == 0 { (a.node_id, b.node_id) } else { (b.node_id, a.node_id) };
      tokio::spawn(async move { engine.ingest_interaction(hour_with(from, to)).await })
    })
    .collect();
  for task in tasks {
    task.await.unwrap().unwrap();
  }

  let risks = engine.list_risks(None).await.unwrap();
  assert_eq!(risks.len(), 1);
  assert_eq!(risks[0].target, EntityKey::Pair(pair));
  assert_eq!(risks[0].level, RiskLevel::Critical);
  assert_eq!(risks[0].days_to_action, 7);
}

#[tokio::test]
async fn risk_workflow_is_linear() {
  let engine = engine().await;
  let (_, pair, a, b) = ready_pair(&engine, -1.0).await;

  // The density sample already valued the pair as critical.
  engine.ingest_interaction(hour_with(a.node_id, b.node_id)).await.unwrap();
  let open = engine.list_risks(Some(RiskStatus::Open)).await.unwrap();
  assert_eq!(open.len(), 1);
  let queued = open[0].clone();

  let skip = engine
    .transition_risk(queued.risk_id, RiskAction::Resolve { note: "fine".into() })
    .await
    .unwrap_err();
  assert!(matches!(skip, Error::Core(rapport_core::Error::InvalidTransition { .. })));
  assert_eq!(engine.get_risk(queued.risk_id).await.unwrap().status, RiskStatus::Open);

  engine
    .transition_risk(queued.risk_id, RiskAction::Assign { assignee: "sam".into() })
    .await
    .unwrap();
  engine.transition_risk(queued.risk_id, RiskAction::Start).await.unwrap();
  let resolved = engine
    .transition_risk(queued.risk_id, RiskAction::Resolve { note: "re-scoped the project".into() })
    .await
    .unwrap();
  assert_eq!(resolved.status, RiskStatus::Resolved);
  assert_eq!(resolved.history.len(), 3);

  // With the old record closed, the next recompute opens a fresh one.
  let next = engine.recompute_pair(pair).await.unwrap();
  let fresh = next.queued.expect("new record");
  assert_ne!(fresh.risk_id, queued.risk_id);
}

#[tokio::test]
async fn escalated_risk_reopens_one_tier_higher() {
  let engine = engine().await;
  // σ = −0.2: churn 0.5 sits in the high band.
  let (_, pair, _, _) = ready_pair(&engine, -0.2).await;
  let open = engine.list_risks(Some(RiskStatus::Open)).await.unwrap();
  assert_eq!(open.len(), 1);
  let record = open[0].clone();
  assert_eq!(record.level, RiskLevel::High);
  assert_eq!(record.days_to_action, 14);

  for action in [
    RiskAction::Assign { assignee: "sam".into() },
    RiskAction::Start,
    RiskAction::Escalate,
  ] {
    engine.transition_risk(record.risk_id, action).await.unwrap();
  }
  // An escalated record is still active, so recomputes queue nothing new.
  assert!(engine.recompute_pair(pair).await.unwrap().queued.is_none());

  let reopened = engine.transition_risk(record.risk_id, RiskAction::Reopen).await.unwrap();
  assert_eq!(reopened.status, RiskStatus::Open);

  let stored = engine.get_risk(record.risk_id).await.unwrap();
  assert_eq!(stored.status, RiskStatus::Open);
  assert_eq!(stored.level, RiskLevel::Critical);
  assert_eq!(stored.days_to_action, 7);
  assert_eq!(stored.history.len(), 4);
  assert_eq!(engine.list_risks(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_risk_record_is_not_found() {
  let engine = engine().await;
  let err = engine.transition_risk(Uuid::new_v4(), RiskAction::Start).await.unwrap_err();
  assert!(err.is_not_found());
}

// ─── Rollup and config ───────────────────────────────────────────────────────

#[tokio::test]
async fn rollup_sums_latest_snapshots() {
  let config = EngineConfig { omega: 50.0, ..Default::default() };
  let engine = engine_with(config).await;
  let (org, _, a, b) = ready_pair(&engine, 0.7).await;

  engine.ingest_interaction(hour_with(a.node_id, b.node_id)).await.unwrap();
  let last = engine.ingest_interaction(hour_with(a.node_id, b.node_id)).await.unwrap();
  let pair_value = last.pair.unwrap().snapshot.value;

  let rollup = engine.rollup(org).await.unwrap();
  assert_eq!(rollup.pair_count, 1);
  assert_eq!(rollup.node_count, 1);
  assert!((rollup.total_value - pair_value).abs() < 1e-12);
  assert_eq!(rollup.total_net_time_value, -2.0);
  assert!((rollup.monetary_value - (pair_value - 2.0) * 50.0).abs() < 1e-9);
  assert_eq!(rollup.at_risk_count, 0);
}

#[tokio::test]
async fn invalid_config_fails_before_any_work() {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let mut config = EngineConfig::default();
  config.risk.bands.cutpoints = [0.5, 0.4, 0.6, 0.7];

  let result = Recomputer::new(store, config);
  assert!(matches!(result, Err(Error::Core(rapport_core::Error::InvalidConfig(_)))));
}
