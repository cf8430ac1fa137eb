//! rapport-server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens an
//! in-process SQLite store, and serves the valuation API over HTTP.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use rapport_engine::Recomputer;
use rapport_server::{StrategyOverrides, expand_tilde, load_config};
use rapport_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Rapport relationship valuation server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Value composition (`multiplicative` or `power_law`), overriding the file.
  #[arg(long)]
  composition: Option<String>,

  /// σ strategy (`weighted`, `rescaled` or `inverse`), overriding the file.
  #[arg(long)]
  sigma_strategy: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let overrides = StrategyOverrides {
    composition:    cli.composition,
    sigma_strategy: cli.sigma_strategy,
  };
  let server_cfg = load_config(&cli.config, &overrides)?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let engine = Recomputer::new(Arc::new(store), server_cfg.engine.clone())
    .context("failed to build recompute pipeline")?;
  tracing::info!(
    composition = %server_cfg.engine.composition,
    sigma = %server_cfg.engine.sigma.strategy,
    lambda_family = %server_cfg.engine.lambda.family,
    "engine configured"
  );

  let app = rapport_server::router(Arc::new(engine));
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
