//! Startup helpers:
//! - database connection + migrations
//! - wiring of repositories into services
//! - background worker spawn helpers

use std::sync::Arc;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db::connect_options;
use crate::db::repository::*;
use crate::metrics::Metrics;
use crate::services::agenda::AgendaService;
use crate::services::appointment::AppointmentService;
use crate::services::auth::AuthService;
use crate::services::business::BusinessService;
use crate::services::ports::{BusinessDirectory, UserDirectory};
use crate::services::reminder::{LogNotifier, ReminderCoordinator, ReminderHandler, ReminderWorker};
use crate::services::users::UserService;
use crate::AppState;

/// Opens the SQLite pool and runs migrations.
///
/// Creates the directory holding the database file when it is missing.
/// Network-only settings (user, password, TLS) are accepted but have no
/// effect on SQLite.
pub async fn init_db(config: &Config) -> Result<SqlitePool> {
    let db = &config.database;
    let path = db.path();

    if db.user.is_some() || db.password.is_some() || db.disable_tls {
        tracing::warn!("DB_USER, DB_PASSWORD and DB_DISABLE_TLS are ignored by the SQLite backend");
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                )
            })?;
        }
    }

    tracing::info!("Opening database {}", path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(db.max_open_conns)
        .min_connections(db.max_idle_conns)
        .connect_with(connect_options(&path))
        .await?;

    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Wires repositories into the services shared by every request.
pub fn build_state(config: Config, db: SqlitePool, metrics: Arc<Metrics>) -> AppState {
    let user_store = Arc::new(UserRepository::new(db.clone()));
    let business_store = Arc::new(BusinessRepository::new(db.clone()));
    let businesses_port = Arc::new(BusinessDirectory(business_store.clone()));

    let agendas = AgendaService::new(
        Arc::new(GeneralAgendaRepository::new(db.clone())),
        Arc::new(DailyAgendaRepository::new(db.clone())),
        businesses_port.clone(),
    );
    let appointments = AppointmentService::new(
        Arc::new(AppointmentRepository::new(db.clone())),
        Arc::new(UserDirectory(user_store.clone())),
        businesses_port,
        agendas.clone(),
    );
    let reminders = ReminderCoordinator::new(
        Arc::new(ReminderQueueRepository::new(db.clone())),
        config.reminder.processing_timeout,
    );

    AppState {
        auth: AuthService::new(&config.auth),
        users: UserService::new(user_store),
        businesses: BusinessService::new(business_store),
        agendas,
        appointments,
        reminders,
        metrics,
        db,
        config,
    }
}

/// Spawns the background workers. Each one listens for the shutdown
/// broadcast; the returned handles let the caller wait for them.
pub fn spawn_background_workers(
    state: Arc<AppState>,
    shutdown: tokio::sync::broadcast::Sender<()>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    if state.config.reminder.enabled {
        let queue = Arc::new(ReminderQueueRepository::new(state.db.clone()));
        let handler = ReminderHandler::new(
            queue.clone(),
            Arc::new(AppointmentRepository::new(state.db.clone())),
            Arc::new(LogNotifier),
        );
        let worker = Arc::new(ReminderWorker::new(
            queue,
            handler,
            state.config.reminder.clone(),
        ));
        handles.push(tokio::spawn(worker.run(shutdown.subscribe())));
    } else {
        tracing::info!("Reminder worker disabled");
    }

    handles
}
