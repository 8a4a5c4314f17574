//! abkit server binary.
//!
//! Reads `abkit.toml` (or the path given with `--config`) plus `ABKIT_*`
//! environment variables, opens the SQLite store, and either migrates it or
//! serves the JSON API over HTTP.
//!
//! ```text
//! abkit-server migrate
//! abkit-server serve
//! ```

mod settings;

use std::{path::PathBuf, sync::Arc};

use abkit_store_sqlite::{SCHEMA_VERSION, SqliteStore};
use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::ServerConfig;

#[derive(Parser)]
#[command(author, version, about = "abkit A/B testing server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "abkit.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Create or upgrade the database schema, then exit.
  Migrate,
  /// Serve the HTTP API. The schema must already be current.
  Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let cfg = ServerConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;

  let store_path = cfg.store_path();
  let store = SqliteStore::open(&store_path, cfg.busy_timeout())
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Migrate => migrate(&store).await,
    Command::Serve => serve(store, &cfg).await,
  }
}

async fn migrate(store: &SqliteStore) -> anyhow::Result<()> {
  let before = store.migrate().await.context("migration failed")?;
  if before >= SCHEMA_VERSION {
    tracing::info!(version = before, "schema already current");
  }
  Ok(())
}

async fn serve(store: SqliteStore, cfg: &ServerConfig) -> anyhow::Result<()> {
  store
    .ensure_schema()
    .await
    .context("store is not ready; run `abkit-server migrate` first")?;

  let app = abkit_api::api_router(Arc::new(store), cfg.visitor_cookie())
    .layer(TraceLayer::new_for_http());

  let address = cfg.address();
  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  tracing::info!("server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::warn!(error = %e, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
}
