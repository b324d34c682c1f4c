/**
 * VIGIL KERNEL - Point d'entrée principal du serveur Vigil
 *
 * RÔLE : Orchestration de tous les modules : config, store, registre, sweep,
 * flush, HTTP. Bootstrap du système complet avec gestion d'erreurs et logging.
 *
 * ARCHITECTURE : Observations via POST /observations → registre en mémoire
 * → flush périodique vers le store, sweep de staleness en tâche de fond.
 */

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vigil_core::Registry;
use vigil_kernel::config::{load_config, API_KEY_ENV};
use vigil_kernel::state::AppState;
use vigil_kernel::{http, monitor, open_store};

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config().await;

    // store + restauration du registre
    let store = open_store(&cfg.store)?;
    let registry = Arc::new(Registry::new(cfg.registry.clone()));
    match store.load_all() {
        Ok(records) => info!("[kernel] restored {} resources from {} store", registry.restore(records), store.name()),
        Err(e) => warn!("[kernel] failed to load resources: {e}"),
    }

    let api_key = std::env::var(API_KEY_ENV).ok();
    if api_key.as_deref().map_or(true, str::is_empty) {
        warn!("[kernel] {API_KEY_ENV} not set, every route but /health will answer 401");
    }
    let app_state = AppState::new(registry, store, api_key);

    // tâches de fond
    monitor::spawn_stale_sweeper(app_state.clone(), cfg.registry.sweep_interval());
    monitor::spawn_flusher(app_state.clone(), cfg.store.flush_interval());

    // HTTP
    let app = http::build_router(app_state.clone());
    let addr: SocketAddr = cfg
        .http
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cfg.http.bind))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("[kernel] listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    // dernier flush avant de rendre la main
    let written = monitor::flush_once(&app_state).await;
    info!("[kernel] shutdown complete ({written} resources flushed)");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("[kernel] failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("[kernel] shutdown requested");
}
