use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use perf_monitor::{collectors::InstrumentedCache, config, server, AppState, Monitor};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "perf-monitor exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // ── 1. Load config ───────────────────────────────────────────
    let cfg = config::load_from_env()?;
    let addr = cfg.server.listen.clone();
    let redis_url = cfg.cache.redis_url.clone();

    // ── 2. Build the monitor and its background workers ─────────
    let monitor = Monitor::new(cfg)?;
    monitor.start();

    // ── 3. Optional instrumented cache ───────────────────────────
    let mut state = AppState::new(monitor.clone());
    if let Some(url) = redis_url {
        match InstrumentedCache::connect(&url, monitor.clone()).await {
            Ok(cache) => {
                tracing::info!(%url, "cache connected");
                state.cache = Some(cache);
            }
            Err(e) => tracing::warn!(%url, error = %e, "cache unavailable, continuing without it"),
        }
    }

    // ── 4. Bind & serve ──────────────────────────────────────────
    let app = server::create_router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    monitor.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("signal received, starting graceful shutdown");
}
