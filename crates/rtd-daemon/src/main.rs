//! rtd-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, loads config, picks
//! the store, builds the reconciler, starts the tick loop and serves HTTP.
//! Route handlers live in `routes.rs`; shared state lives in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use rtd_config::{ConfigConsumer, ReconcilerConfig, UnusedKeyPolicy};
use rtd_daemon::{routes, state};
use rtd_db::{DomainStore, MemDomainStore, PgDomainStore};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

const ENV_DAEMON_ADDR: &str = "RTD_DAEMON_ADDR";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience).
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = rtd_config::load_from_env().context("load config")?;
    let unused = rtd_config::report_unused_keys(
        ConfigConsumer::Daemon,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )?;
    if !unused.is_clean() {
        warn!(keys = ?unused.unused_leaf_pointers, "config contains keys the daemon does not read");
    }
    info!(config_hash = %loaded.config_hash, "config loaded");

    let rcfg = ReconcilerConfig::from_config_json(&loaded.config_json)?.with_env_overrides()?;
    let (store, store_kind) = open_store().await?;

    let reconciler = Arc::new(rtd_reconcile::reconciler_from_config(
        &loaded.config_json,
        store,
    )?);
    if reconciler.is_disabled() {
        warn!("reconciler starts DISABLED; POST /v1/reconciler/enable to resume");
    }

    let shared = Arc::new(state::AppState::new(reconciler, store_kind));

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
    state::spawn_reconcile_loop(Arc::clone(&shared), rcfg.tick_interval());
    info!(
        interval_ms = rcfg.tick_interval_ms,
        lock_timeout_secs = rcfg.lock_timeout_secs,
        "reconcile loop started"
    );

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8898)));
    info!("rtd-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

/// Postgres when RTD_DATABASE_URL is set (migrated at boot), otherwise an
/// in-memory store that loses everything on restart.
async fn open_store() -> anyhow::Result<(Arc<dyn DomainStore>, &'static str)> {
    if std::env::var(rtd_db::ENV_DB_URL).is_err() {
        warn!(
            "{} not set; using in-memory store (dev mode, state is lost on restart)",
            rtd_db::ENV_DB_URL
        );
        let store: Arc<dyn DomainStore> = Arc::new(MemDomainStore::new());
        return Ok((store, "memory"));
    }
    let pool = rtd_db::connect_from_env().await?;
    rtd_db::migrate(&pool).await?;
    let store: Arc<dyn DomainStore> = Arc::new(PgDomainStore::new(pool));
    Ok((store, "postgres"))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl-c handler failed; serving until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var(ENV_DAEMON_ADDR).ok()?.parse().ok()
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
