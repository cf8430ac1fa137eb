//! Server wiring for Rapport: configuration loading and the top-level router.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use axum::{Router, routing::get};
use rapport_core::{
  EngineConfig,
  config::parse_strategy,
  sigma::SigmaStrategy,
  store::ValuationStore,
  valuation::ValueComposition,
};
use rapport_engine::Recomputer;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `RAPPORT_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  #[serde(default)]
  pub engine:     EngineConfig,
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("rapport.db") }

/// Strategy names given on the command line, applied over the file.
#[derive(Debug, Default, Clone)]
pub struct StrategyOverrides {
  pub composition:    Option<String>,
  pub sigma_strategy: Option<String>,
}

impl StrategyOverrides {
  pub fn apply(&self, engine: &mut EngineConfig) -> rapport_core::Result<()> {
    if let Some(name) = &self.composition {
      engine.composition = parse_strategy::<ValueComposition>(name)?;
    }
    if let Some(name) = &self.sigma_strategy {
      engine.sigma.strategy = parse_strategy::<SigmaStrategy>(name)?;
    }
    Ok(())
  }
}

/// Layer `path` (optional) under `RAPPORT_*` environment variables. Nested
/// keys use `__`, e.g. `RAPPORT_ENGINE__OMEGA=40`.
pub fn load_config(path: &Path, overrides: &StrategyOverrides) -> anyhow::Result<ServerConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix("RAPPORT")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let mut server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  overrides
    .apply(&mut server_cfg.engine)
    .context("invalid strategy override")?;
  server_cfg
    .engine
    .validate()
    .context("invalid engine configuration")?;

  Ok(server_cfg)
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The API under `/api` plus an unauthenticated `/health` check.
pub fn router<S>(engine: Arc<Recomputer<S>>) -> Router
where
  S: ValuationStore + 'static,
{
  Router::new()
    .route("/health", get(|| async { "ok" }))
    .nest("/api", rapport_api::api_router(engine))
    .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use rapport_core::{lambda::LambdaFamily, sigma::SynergyMultiplier};
  use rapport_store_sqlite::SqliteStore;
  use tower::ServiceExt as _;

  fn from_toml(toml: &str) -> ServerConfig {
    config::Config::builder()
      .add_source(config::File::from_str(toml, config::FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn empty_file_uses_defaults() {
    let cfg = from_toml("");
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.engine, EngineConfig::default());
  }

  #[test]
  fn engine_table_overrides() {
    let cfg = from_toml(
      r#"
        host = "0.0.0.0"
        port = 9000
        store_path = "/var/lib/rapport.db"

        [engine]
        omega = 42.5
        composition = "power_law"

        [engine.lambda]
        family = "standard"

        [engine.multiplier]
        kind = "bounded_growth"
        s_max = 3.0
        tau_years = 1.5
      "#,
    );
    assert_eq!(cfg.host, "0.0.0.0");
    assert_eq!(cfg.engine.omega, 42.5);
    assert_eq!(cfg.engine.composition, ValueComposition::PowerLaw);
    assert_eq!(cfg.engine.lambda.family, LambdaFamily::Standard);
    assert_eq!(
      cfg.engine.multiplier,
      SynergyMultiplier::BoundedGrowth { s_max: 3.0, tau_years: 1.5 }
    );
  }

  #[test]
  fn strategy_overrides_apply_or_fail() {
    let mut engine = EngineConfig::default();
    let overrides = StrategyOverrides {
      composition:    Some("power_law".into()),
      sigma_strategy: Some("rescaled".into()),
    };
    overrides.apply(&mut engine).unwrap();
    assert_eq!(engine.composition, ValueComposition::PowerLaw);
    assert_eq!(engine.sigma.strategy, SigmaStrategy::Rescaled);

    let bad = StrategyOverrides { sigma_strategy: Some("cubic".into()), ..Default::default() };
    assert!(matches!(
      bad.apply(&mut engine),
      Err(rapport_core::Error::UnknownStrategy(name)) if name == "cubic"
    ));
  }

  #[test]
  fn tilde_expands_to_home() {
    let expanded = expand_tilde(Path::new("~/rapport.db"));
    if let Ok(home) = std::env::var("HOME") {
      assert_eq!(expanded, PathBuf::from(home).join("rapport.db"));
    }
    assert_eq!(expand_tilde(Path::new("/tmp/x.db")), PathBuf::from("/tmp/x.db"));
  }

  #[tokio::test]
  async fn health_and_nested_api_respond() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let engine = Recomputer::new(Arc::new(store), EngineConfig::default()).unwrap();
    let app = router(Arc::new(engine));

    let resp = app
      .clone()
      .oneshot(Request::get("/health").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
      .oneshot(Request::get("/api/risks").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
  }
}
