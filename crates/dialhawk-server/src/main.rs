//! Dialhawk server binary — the main entry point for the platform.
//!
//! Starts an axum HTTP/WebSocket server with structured logging,
//! database initialization, the dispatch background tasks (call
//! workers, autopilot sweep, usage reset scheduler), and graceful
//! shutdown on SIGTERM/SIGINT.

use dialhawk_server::{app, build_state, config};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("DIALHAWK_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration — the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // Initialize database
    let pool = dialhawk_db::create_pool(
        &config.database.path,
        dialhawk_db::DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )
    .expect("failed to create database pool — check database.path in config");

    {
        let conn = pool
            .get()
            .expect("failed to get database connection for migrations");
        let applied =
            dialhawk_db::run_migrations(&conn).expect("failed to run database migrations");
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }

        // Jobs stranded mid-claim by a previous crash go back on the
        // queue before any worker polls.
        let recovered = dialhawk_dispatch::queue::recover_claimed(&conn)
            .expect("failed to recover stranded dial jobs");
        if recovered > 0 {
            tracing::info!(count = recovered, "recovered stranded dial jobs");
        }
    }

    // Build application state
    let state =
        build_state(&config, pool.clone()).expect("failed to build upstream service clients");
    let lead_source = state.lead_source.clone();

    // Background tasks: call workers, autopilot sweep, usage resets.
    let telephony = Arc::new(dialhawk_server::wiring::RestTelephony::new(
        config.telephony.clone(),
    ));
    let worker_handles = dialhawk_dispatch::spawn_worker_pool(
        pool.clone(),
        telephony,
        dialhawk_dispatch::WorkerConfig {
            workers: config.dispatch.workers,
            poll_interval_ms: config.dispatch.poll_interval_ms,
        },
    );
    tracing::info!(count = worker_handles.len(), "call workers started");

    tokio::spawn(dialhawk_dispatch::autopilot::start_autopilot_task(
        pool.clone(),
        lead_source,
        config.dispatch.autopilot_interval_seconds,
    ));
    tokio::spawn(dialhawk_dispatch::usage::start_usage_reset_task(
        pool.clone(),
        config.dispatch.usage_reset_interval_seconds,
    ));

    // Build application
    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting dialhawk server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address — is another process using this port?");

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("dialhawk server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
