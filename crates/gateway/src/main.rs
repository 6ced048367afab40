use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{header, Method};
use clap::{Parser, Subcommand};
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use dt_gateway::api;
use dt_gateway::config::Config;
use dt_gateway::encounter_lock::EncounterLockMap;
use dt_gateway::hub::EncounterHub;
use dt_gateway::state::AppState;

#[derive(Parser)]
#[command(name = "dndtracker", about = "Collaborative encounter state server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the server (default).
    Serve,
    /// Print the version and exit.
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            run_server(Config::from_env()).await
        }
        Some(Command::Version) => {
            println!("dndtracker {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing (only for the `serve` command).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,dt_gateway=debug")),
        )
        .json()
        .init();
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    tracing::info!("dndtracker starting");
    let config = Arc::new(config);

    // ── Encounter store ──────────────────────────────────────────────
    let store = dt_store::create_store(config.database_url.as_deref(), &config.server_salt)
        .context("initializing encounter store")?;
    match &config.database_url {
        Some(url) => tracing::info!(database_url = %url, "durable encounter store ready"),
        None => tracing::info!("in-memory encounter store ready"),
    }

    // ── Push hub + per-encounter write locks ─────────────────────────
    let hub = Arc::new(EncounterHub::new());
    let encounter_locks = Arc::new(EncounterLockMap::new());
    tracing::info!("push hub + encounter locks ready");

    let state = AppState {
        config: config.clone(),
        store,
        hub,
        encounter_locks: encounter_locks.clone(),
    };

    // ── Periodic lock pruning ────────────────────────────────────────
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            encounter_locks.prune_idle();
        }
    });

    // ── Router ───────────────────────────────────────────────────────
    tracing::info!(
        max_concurrent = config.max_concurrent_requests,
        "concurrency limit set"
    );
    let app = api::router()
        .layer(build_cors_layer())
        .layer(tower::limit::ConcurrencyLimitLayer::new(
            config.max_concurrent_requests,
        ))
        .with_state(state);

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "dndtracker listening");

    axum::serve(listener, app)
        .await
        .context("axum server error")?;

    Ok(())
}

/// Permissive CORS: the browser client is served from its own origin and
/// every request carries its own bearer token, which is the actual access
/// control.
fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}
