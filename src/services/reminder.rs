//! Appointment reminders: the coordinator turns appointment events into queue
//! operations after commit, the worker drains due tasks and the handler
//! delivers them at least once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::ReminderConfig;
use crate::db::models::{task_status, Appointment, AppointmentStatus, ReminderPayload, ReminderTask};
use crate::db::{AppointmentStore, ReminderQueue, RetryOutcome, StoreError, StoreResult};

/// Changes to an appointment that affect its reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentEvent {
    Scheduled {
        id: Uuid,
        user_id: Uuid,
        scheduled_on: DateTime<Utc>,
    },
    Rescheduled {
        id: Uuid,
        user_id: Uuid,
        scheduled_on: DateTime<Utc>,
    },
    Cancelled {
        id: Uuid,
    },
    Deleted {
        id: Uuid,
    },
}

impl AppointmentEvent {
    pub fn appointment_id(&self) -> Uuid {
        match *self {
            AppointmentEvent::Scheduled { id, .. }
            | AppointmentEvent::Rescheduled { id, .. }
            | AppointmentEvent::Cancelled { id }
            | AppointmentEvent::Deleted { id } => id,
        }
    }
}

// ============================================================================
// Coordinator
// ============================================================================

pub struct ReminderCoordinator {
    queue: Arc<dyn ReminderQueue>,
    timeout_seconds: i64,
}

impl ReminderCoordinator {
    pub fn new(queue: Arc<dyn ReminderQueue>, processing_timeout: Duration) -> Self {
        ReminderCoordinator {
            queue,
            timeout_seconds: processing_timeout.as_secs().max(1) as i64,
        }
    }

    pub async fn apply(&self, event: &AppointmentEvent) -> StoreResult<()> {
        match *event {
            AppointmentEvent::Scheduled {
                id,
                user_id,
                scheduled_on,
            }
            | AppointmentEvent::Rescheduled {
                id,
                user_id,
                scheduled_on,
            } => {
                self.queue
                    .enqueue(
                        id,
                        scheduled_on,
                        &ReminderPayload { user_id },
                        self.timeout_seconds,
                    )
                    .await
            }
            AppointmentEvent::Cancelled { id } | AppointmentEvent::Deleted { id } => {
                self.queue.cancel(id).await
            }
        }
    }

    /// Applies the event once the appointment change is committed. Failures
    /// are logged and swallowed; the appointment stays as committed.
    pub async fn publish(&self, event: &AppointmentEvent) {
        match self.apply(event).await {
            Ok(()) => tracing::debug!("Reminder updated for {:?}", event),
            Err(e) => tracing::warn!(
                "Failed to update reminder for appointment {}: {}",
                event.appointment_id(),
                e
            ),
        }
    }
}

// ============================================================================
// Delivery
// ============================================================================

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn remind(&self, appointment: &Appointment, payload: &ReminderPayload) -> anyhow::Result<()>;
}

/// Writes reminders to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn remind(&self, appointment: &Appointment, payload: &ReminderPayload) -> anyhow::Result<()> {
        tracing::info!(
            "Reminder for user {}: appointment {} with business {} at {}",
            payload.user_id,
            appointment.id,
            appointment.business_id,
            appointment.scheduled_on
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    Delivered,
    Dropped(&'static str),
}

pub struct ReminderHandler {
    queue: Arc<dyn ReminderQueue>,
    appointments: Arc<dyn AppointmentStore>,
    notifier: Arc<dyn Notifier>,
}

impl ReminderHandler {
    pub fn new(
        queue: Arc<dyn ReminderQueue>,
        appointments: Arc<dyn AppointmentStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        ReminderHandler {
            queue,
            appointments,
            notifier,
        }
    }

    /// Delivers the reminder unless the task or its appointment changed since
    /// the task was claimed. Safe to call more than once per task.
    pub async fn handle(&self, task: &ReminderTask) -> anyhow::Result<HandleOutcome> {
        match self.queue.get(task.id).await {
            Ok(current) if current.status == task_status::DONE => {
                return Ok(HandleOutcome::Dropped("already delivered"));
            }
            Ok(current) if current.fire_at != task.fire_at => {
                return Ok(HandleOutcome::Dropped("task was replaced"));
            }
            Ok(_) => {}
            Err(StoreError::NotFound) => return Ok(HandleOutcome::Dropped("task was cancelled")),
            Err(e) => return Err(e.into()),
        }

        let payload: ReminderPayload = serde_json::from_str(&task.payload)?;

        let appointment = match self.appointments.query_by_id(task.id).await {
            Ok(appointment) => appointment,
            Err(StoreError::NotFound) => {
                return Ok(HandleOutcome::Dropped("appointment was deleted"));
            }
            Err(e) => return Err(e.into()),
        };
        if appointment.status == AppointmentStatus::Cancelled {
            return Ok(HandleOutcome::Dropped("appointment was cancelled"));
        }
        if appointment.scheduled_on != task.fire_at {
            return Ok(HandleOutcome::Dropped("appointment was rescheduled"));
        }

        self.notifier.remind(&appointment, &payload).await?;
        Ok(HandleOutcome::Delivered)
    }
}

// ============================================================================
// Worker
// ============================================================================

pub struct ReminderWorker {
    queue: Arc<dyn ReminderQueue>,
    handler: ReminderHandler,
    config: ReminderConfig,
}

impl ReminderWorker {
    pub fn new(queue: Arc<dyn ReminderQueue>, handler: ReminderHandler, config: ReminderConfig) -> Self {
        ReminderWorker {
            queue,
            handler,
            config,
        }
    }

    /// Delay before retrying a task that already failed `attempts` times.
    pub fn backoff(&self, attempts: i64) -> Duration {
        let exponent = attempts.clamp(0, 20) as u32;
        self.config
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.config.max_backoff)
    }

    async fn process(&self, task: ReminderTask) {
        let timeout = Duration::from_secs(task.timeout_seconds.max(1) as u64);
        let result = match tokio::time::timeout(timeout, self.handler.handle(&task)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("reminder handler timed out after {:?}", timeout)),
        };

        match result {
            Ok(outcome) => {
                if let HandleOutcome::Dropped(reason) = outcome {
                    tracing::debug!("Dropped reminder {}: {}", task.id, reason);
                }
                match self.queue.complete(&task).await {
                    Ok(true) => {}
                    Ok(false) => tracing::debug!("Reminder {} changed while in flight", task.id),
                    Err(e) => tracing::warn!("Failed to complete reminder {}: {}", task.id, e),
                }
            }
            Err(e) => {
                let delay = chrono::Duration::from_std(self.backoff(task.attempts))
                    .unwrap_or_else(|_| chrono::Duration::hours(1));
                let retry_at = Utc::now() + delay;
                match self
                    .queue
                    .fail(&task, &e.to_string(), retry_at, self.config.max_attempts)
                    .await
                {
                    Ok(RetryOutcome::Rescheduled) => tracing::warn!(
                        "Reminder {} failed, retrying at {}: {}",
                        task.id,
                        retry_at,
                        e
                    ),
                    Ok(RetryOutcome::Dead) => tracing::error!(
                        "Reminder {} failed permanently after {} attempts: {}",
                        task.id,
                        task.attempts + 1,
                        e
                    ),
                    Ok(RetryOutcome::Superseded) => {
                        tracing::debug!("Reminder {} changed while in flight", task.id)
                    }
                    Err(store) => {
                        tracing::warn!("Failed to record reminder {} failure: {}", task.id, store)
                    }
                }
            }
        }
    }

    /// Claims and processes one batch of due tasks. Returns the batch size.
    pub async fn run_once(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let tasks = self
            .queue
            .claim_due(now, self.config.concurrency.max(1) as i64)
            .await?;
        let claimed = tasks.len();
        futures::future::join_all(tasks.into_iter().map(|task| self.process(task))).await;
        Ok(claimed)
    }

    /// Polls until shutdown is signalled. An in-flight batch is finished
    /// before the worker exits.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            "Reminder worker started (poll every {:?}, {} at a time)",
            self.config.poll_interval,
            self.config.concurrency
        );
        loop {
            match self.run_once(Utc::now()).await {
                Ok(0) => {}
                Ok(n) => {
                    tracing::debug!("Processed {} reminder(s)", n);
                    continue;
                }
                Err(e) => tracing::warn!("Failed to claim due reminders: {}", e),
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Reminder worker shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeZone;
    use sqlx::SqlitePool;

    use super::*;
    use crate::db::repository::testing::{seed_business, seed_user};
    use crate::db::repository::{AppointmentRepository, ReminderQueueRepository};
    use crate::db::testing::memory_pool;

    #[derive(Default)]
    struct CountingNotifier {
        sent: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn remind(&self, _: &Appointment, _: &ReminderPayload) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("gateway unavailable");
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config() -> ReminderConfig {
        ReminderConfig {
            enabled: true,
            poll_interval: Duration::from_secs(1),
            concurrency: 4,
            processing_timeout: Duration::from_secs(60),
            max_attempts: 2,
            initial_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(300),
        }
    }

    struct Fixture {
        queue: Arc<ReminderQueueRepository>,
        appointments: Arc<AppointmentRepository>,
        coordinator: ReminderCoordinator,
        appointment: Appointment,
    }

    async fn fixture(pool: &SqlitePool) -> Fixture {
        let user = seed_user(pool, "ada@example.com", "+14155550100").await;
        let business = seed_business(pool, user.id).await;
        let appointments = Arc::new(AppointmentRepository::new(pool.clone()));
        let queue = Arc::new(ReminderQueueRepository::new(pool.clone()));

        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            business_id: business.id,
            user_id: user.id,
            status: AppointmentStatus::Scheduled,
            scheduled_on: Utc.with_ymd_and_hms(2030, 6, 3, 10, 0, 0).unwrap(),
            date_created: now,
            date_updated: now,
        };
        appointments.create(&appointment).await.unwrap();

        Fixture {
            coordinator: ReminderCoordinator::new(queue.clone(), Duration::from_secs(60)),
            queue,
            appointments,
            appointment,
        }
    }

    fn scheduled(appointment: &Appointment) -> AppointmentEvent {
        AppointmentEvent::Scheduled {
            id: appointment.id,
            user_id: appointment.user_id,
            scheduled_on: appointment.scheduled_on,
        }
    }

    fn worker(f: &Fixture, notifier: Arc<CountingNotifier>) -> ReminderWorker {
        let handler = ReminderHandler::new(f.queue.clone(), f.appointments.clone(), notifier);
        ReminderWorker::new(f.queue.clone(), handler, config())
    }

    fn after_fire(appointment: &Appointment) -> DateTime<Utc> {
        appointment.scheduled_on + chrono::Duration::seconds(1)
    }

    #[tokio::test]
    async fn coordinator_tracks_appointment_events() {
        let pool = memory_pool().await;
        let f = fixture(&pool).await;

        f.coordinator.apply(&scheduled(&f.appointment)).await.unwrap();
        let task = f.queue.get(f.appointment.id).await.unwrap();
        assert_eq!(task.fire_at, f.appointment.scheduled_on);
        assert_eq!(task.timeout_seconds, 60);

        let later = f.appointment.scheduled_on + chrono::Duration::minutes(30);
        f.coordinator
            .apply(&AppointmentEvent::Rescheduled {
                id: f.appointment.id,
                user_id: f.appointment.user_id,
                scheduled_on: later,
            })
            .await
            .unwrap();
        assert_eq!(f.queue.get(f.appointment.id).await.unwrap().fire_at, later);

        let cancelled = AppointmentEvent::Cancelled {
            id: f.appointment.id,
        };
        f.coordinator.apply(&cancelled).await.unwrap();
        f.coordinator.apply(&cancelled).await.unwrap();
        assert_eq!(
            f.queue.get(f.appointment.id).await,
            Err(StoreError::NotFound)
        );
    }

    #[tokio::test]
    async fn due_reminders_are_delivered_once() {
        let pool = memory_pool().await;
        let f = fixture(&pool).await;
        let notifier = Arc::new(CountingNotifier::default());
        let worker = worker(&f, notifier.clone());

        f.coordinator.apply(&scheduled(&f.appointment)).await.unwrap();

        let before = f.appointment.scheduled_on - chrono::Duration::seconds(1);
        assert_eq!(worker.run_once(before).await.unwrap(), 0);

        assert_eq!(worker.run_once(after_fire(&f.appointment)).await.unwrap(), 1);
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);

        let task = f.queue.get(f.appointment.id).await.unwrap();
        assert_eq!(task.status, task_status::DONE);
        assert!(task.delivered_at.is_some());

        // A second delivery attempt for the same task is a no-op.
        assert_eq!(
            worker.handler.handle(&task).await.unwrap(),
            HandleOutcome::Dropped("already delivered")
        );
        assert_eq!(worker.run_once(after_fire(&f.appointment)).await.unwrap(), 0);
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);

        // Deleting the appointment purges the delivered task.
        f.coordinator
            .apply(&AppointmentEvent::Deleted {
                id: f.appointment.id,
            })
            .await
            .unwrap();
        assert_eq!(
            f.queue.get(f.appointment.id).await,
            Err(StoreError::NotFound)
        );
    }

    #[tokio::test]
    async fn cancelled_or_deleted_appointments_are_dropped() {
        let pool = memory_pool().await;
        let f = fixture(&pool).await;
        let notifier = Arc::new(CountingNotifier::default());
        let worker = worker(&f, notifier.clone());

        f.coordinator.apply(&scheduled(&f.appointment)).await.unwrap();
        let cancelled = Appointment {
            status: AppointmentStatus::Cancelled,
            ..f.appointment.clone()
        };
        f.appointments.update(&cancelled).await.unwrap();

        assert_eq!(worker.run_once(after_fire(&f.appointment)).await.unwrap(), 1);
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 0);
        assert_eq!(
            f.queue.get(f.appointment.id).await.unwrap().status,
            task_status::DONE
        );

        f.appointments.delete(f.appointment.id).await.unwrap();
        f.coordinator.apply(&scheduled(&f.appointment)).await.unwrap();
        let claimed = f
            .queue
            .claim_due(after_fire(&f.appointment), 1)
            .await
            .unwrap();
        assert_eq!(
            worker.handler.handle(&claimed[0]).await.unwrap(),
            HandleOutcome::Dropped("appointment was deleted")
        );
    }

    #[tokio::test]
    async fn failures_back_off_until_dead() {
        let pool = memory_pool().await;
        let f = fixture(&pool).await;
        let notifier = Arc::new(CountingNotifier {
            sent: AtomicUsize::new(0),
            fail: true,
        });
        let worker = worker(&f, notifier);

        assert_eq!(worker.backoff(0), Duration::from_secs(30));
        assert_eq!(worker.backoff(2), Duration::from_secs(120));
        assert_eq!(worker.backoff(10), Duration::from_secs(300));

        f.coordinator.apply(&scheduled(&f.appointment)).await.unwrap();

        assert_eq!(worker.run_once(after_fire(&f.appointment)).await.unwrap(), 1);
        let task = f.queue.get(f.appointment.id).await.unwrap();
        assert_eq!(task.status, task_status::PENDING);
        assert_eq!(task.attempts, 1);
        assert_eq!(task.last_error.as_deref(), Some("gateway unavailable"));

        let retry_due = task.next_attempt_at + chrono::Duration::seconds(1);
        assert_eq!(worker.run_once(retry_due).await.unwrap(), 1);
        let task = f.queue.get(f.appointment.id).await.unwrap();
        assert_eq!(task.status, task_status::DEAD);
        assert_eq!(task.attempts, 2);
    }
}
