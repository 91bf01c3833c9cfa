use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod calendar;
mod config;
mod db;
mod error;
mod metrics;
mod middleware;
mod query;
mod routes;
mod services;

use config::{Config, LogFormat};
use metrics::Metrics;
use services::{
    agenda::AgendaService, appointment::AppointmentService, auth::AuthService,
    business::BusinessService, init, reminder::ReminderCoordinator, users::UserService,
};

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub metrics: Arc<Metrics>,
    pub auth: AuthService,
    pub users: UserService,
    pub businesses: BusinessService,
    pub agendas: AgendaService,
    pub appointments: AppointmentService,
    pub reminders: ReminderCoordinator,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "booking_service=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("Failed to bind SIGTERM: {e}"))?;
        tokio::select! {
            res = ctrl_c => res.map_err(|e| anyhow::anyhow!("Failed to listen for Ctrl+C: {e}"))?,
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c
            .await
            .map_err(|e| anyhow::anyhow!("Failed to listen for Ctrl+C: {e}"))?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    tracing::info!(
        "Starting booking service {} (idle timeout {:?}, shutdown timeout {:?})",
        env!("CARGO_PKG_VERSION"),
        config.web.idle_timeout,
        config.web.shutdown_timeout
    );

    let pool = init::init_db(&config).await?;
    let metrics = Arc::new(Metrics::new());
    let app_state = Arc::new(init::build_state(config.clone(), pool, metrics.clone()));

    app_state.auth.ensure_active_key().await?;
    tracing::info!("Signing tokens with key {:?}", app_state.auth.active_kid());

    let (shutdown_tx, _shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
    let bg_handles = init::spawn_background_workers(app_state.clone(), shutdown_tx.clone());

    let api = routes::api_router(app_state.clone())?;
    let debug = routes::debug_router(metrics);

    let api_listener = tokio::net::TcpListener::bind(config.web.api_host).await?;
    let debug_listener = tokio::net::TcpListener::bind(config.web.debug_host).await?;
    tracing::info!("API listening on {}", config.web.api_host);
    tracing::info!("Debug listening on {}", config.web.debug_host);

    let api_shutdown = {
        let mut rx = shutdown_tx.subscribe();
        async move {
            let _ = rx.recv().await;
        }
    };
    let api_server = axum::serve(
        api_listener,
        api.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(api_shutdown);

    // The debug server stops with the process.
    let debug_server = tokio::spawn(async move {
        if let Err(e) = axum::serve(debug_listener, debug).await {
            tracing::error!("Debug server error: {}", e);
        }
    });

    let signal_tx = shutdown_tx.clone();
    let signal_task = tokio::spawn(async move {
        let res = shutdown_signal().await;
        tracing::info!("Shutdown signal received, notifying background workers");
        let _ = signal_tx.send(());
        res
    });

    let mut api_task = tokio::spawn(async move { api_server.await });

    let signal_result = tokio::select! {
        res = &mut api_task => {
            let _ = shutdown_tx.send(());
            debug_server.abort();
            return match res {
                Ok(Ok(())) => Err(anyhow::anyhow!("API server stopped unexpectedly")),
                Ok(Err(e)) => Err(e.into()),
                Err(e) => Err(anyhow::anyhow!("API server task failed: {e}")),
            };
        }
        res = signal_task => res.map_err(|e| anyhow::anyhow!("signal task failed: {e}"))?,
    };

    let shutdown_wait = config.web.shutdown_timeout;
    tracing::info!(
        "Waiting up to {}s for in-flight requests and background workers",
        shutdown_wait.as_secs()
    );

    let drain = async {
        if let Ok(Err(e)) = api_task.await {
            tracing::error!("Server error during shutdown: {}", e);
        }
        for h in bg_handles {
            let _ = h.await;
        }
    };
    if tokio::time::timeout(shutdown_wait, drain).await.is_err() {
        tracing::warn!("Shutdown timeout elapsed with work still in flight");
    }
    debug_server.abort();

    signal_result?;
    tracing::info!("Shutdown complete");
    Ok(())
}
