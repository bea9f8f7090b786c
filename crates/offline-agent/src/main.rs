mod admin;
mod config;
mod error;
mod lifecycle;
mod network;
mod proxy;
mod push;
mod router;
mod strategy;
mod sync;

use admin::{
    click_handler, enqueue_note_handler, list_notes_handler, push_handler, stats_handler,
    sync_handler, ws_notifications_handler,
};
use axum::routing::{any, get, post};
use axum::Router;
use clap::Parser;
use config::{Config, ReloadPlan};
use network::HyperNetwork;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;
use proxy::{proxy_handler, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use sync::sqlite::SqliteNoteQueue;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

/// Offline caching agent for the second-brain web app.
#[derive(Parser)]
#[command(name = "offline-agent")]
struct Args {
    /// Path to the TOML config file (watched for changes)
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let args = Args::parse();

    let config = if args.config.exists() {
        match Config::load(&args.config) {
            Ok(c) => {
                tracing::info!(path = %args.config.display(), "loaded config");
                c
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load config, using defaults");
                Config::default()
            }
        }
    } else {
        tracing::info!(path = %args.config.display(), "no config file found, using defaults");
        Config::default()
    };
    let origin = config.origin.uri()?;

    let prom_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    let queue = Arc::new(SqliteNoteQueue::open(&config.sync.db_path).await?);
    let state = Arc::new(AppState::new(
        config.clone(),
        origin,
        Arc::new(HyperNetwork::new()),
        queue,
    ));

    let shutdown = CancellationToken::new();

    let admin_router = Router::new()
        .route("/ws/notifications", get(ws_notifications_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/sync/{tag}", post(sync_handler))
        .route("/api/notes", post(enqueue_note_handler).get(list_notes_handler))
        .route("/api/push", post(push_handler))
        .route("/api/notifications/{tag}/click", post(click_handler))
        .route(
            "/metrics",
            get(move || {
                let h = prom_handle.clone();
                async move { h.render() }
            }),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::clone(&state));

    let proxy_router = Router::new()
        .route("/{*path}", any(proxy_handler))
        .route("/", any(proxy_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::clone(&state));

    let proxy_addr = config.server.listen_addr.clone();
    let admin_addr = config.server.admin_addr.clone();

    tracing::info!(
        proxy = %proxy_addr,
        admin = %admin_addr,
        origin = %config.origin.url,
        cache = %config.cache.name,
        core_assets = config.cache.core_assets.len(),
        "offline agent starting"
    );

    let proxy_listener = tokio::net::TcpListener::bind(&proxy_addr).await?;
    let admin_listener = tokio::net::TcpListener::bind(&admin_addr).await?;

    // Install + activate before serving intercepted traffic; requests that
    // arrive meanwhile pass straight through.
    let lifecycle_state = Arc::clone(&state);
    tokio::spawn(async move {
        let outcome = lifecycle_state.start().await;
        tracing::info!(?outcome, "agent active");
    });

    tokio::spawn(sync::run_sync_timer(Arc::clone(&state), shutdown.clone()));

    spawn_config_watcher(args.config, config, Arc::clone(&state));

    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal(shutdown_clone).await;
    });

    let proxy_future = axum::serve(proxy_listener, proxy_router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());
    let admin_future = axum::serve(admin_listener, admin_router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());

    tokio::select! {
        result = proxy_future => {
            if let Err(e) = result {
                tracing::error!(error = %e, "proxy server error");
            }
        }
        result = admin_future => {
            if let Err(e) = result {
                tracing::error!(error = %e, "admin server error");
            }
        }
    }

    tracing::info!("offline agent shut down");
    Ok(())
}

/// Listen for SIGINT (Ctrl+C) or SIGTERM and cancel the shutdown token.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "no SIGTERM handler, waiting for Ctrl+C only");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    tracing::info!("shutdown signal received, draining connections...");
    token.cancel();
}

/// Watch the config file and apply reloadable changes at runtime.
fn spawn_config_watcher(config_path: PathBuf, initial_config: Config, state: Arc<AppState>) {
    let current_config = Arc::new(Mutex::new(initial_config));
    let runtime = tokio::runtime::Handle::current();

    let config_path_clone = config_path.clone();
    let mut watcher = match notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        if let Ok(event) = res {
            if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                match Config::load(&config_path_clone) {
                    Ok(new_config) => {
                        let plan = {
                            let mut old = current_config.lock();
                            let plan = config::diff(&old, &new_config);
                            match &plan {
                                ReloadPlan::Swap(applied) | ReloadPlan::Reinstall(applied) => {
                                    *old = applied.clone();
                                }
                                ReloadPlan::Unchanged => {}
                            }
                            plan
                        };
                        let state = Arc::clone(&state);
                        runtime.spawn(async move { state.apply_reload(plan).await });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to reload config");
                    }
                }
            }
        }
    }) {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!(error = %e, "failed to start config watcher");
            return;
        }
    };

    if let Err(e) = watcher.watch(&config_path, RecursiveMode::NonRecursive) {
        tracing::warn!(error = %e, path = %config_path.display(), "failed to watch config file");
        return;
    }

    // Leak the watcher so it lives for the process lifetime
    std::mem::forget(watcher);
    tracing::info!("config file watcher started");
}
