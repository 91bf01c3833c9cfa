//! Store contracts the engines talk to. Every store can be rebound to an open
//! [`Tx`] with `with_transaction`; an unbound store runs in auto-commit mode.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::db::models::*;
use crate::db::Tx;
use crate::query::{OrderBy, Page};

/// The only failures a store reports. Engines translate them into domain
/// errors at their boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("unique constraint violated")]
    Conflict,

    #[error("store failure: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
            other => StoreError::Internal(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait GeneralAgendaStore: Send + Sync {
    fn with_transaction(&self, tx: &Tx) -> Arc<dyn GeneralAgendaStore>;

    async fn create(&self, agenda: &GeneralAgenda) -> StoreResult<()>;
    async fn update(&self, agenda: &GeneralAgenda) -> StoreResult<()>;
    async fn delete(&self, id: Uuid) -> StoreResult<()>;
    async fn query(
        &self,
        filter: &GeneralAgendaFilter,
        order: OrderBy,
        page: Page,
    ) -> StoreResult<Vec<GeneralAgenda>>;
    async fn count(&self, filter: &GeneralAgendaFilter) -> StoreResult<i64>;
    async fn query_by_id(&self, id: Uuid) -> StoreResult<GeneralAgenda>;
    async fn query_by_business_id(&self, business_id: Uuid) -> StoreResult<GeneralAgenda>;
}

#[async_trait]
pub trait DailyAgendaStore: Send + Sync {
    fn with_transaction(&self, tx: &Tx) -> Arc<dyn DailyAgendaStore>;

    async fn create(&self, agenda: &DailyAgenda) -> StoreResult<()>;
    async fn update(&self, agenda: &DailyAgenda) -> StoreResult<()>;
    async fn delete(&self, id: Uuid) -> StoreResult<()>;
    async fn query(
        &self,
        criteria: &DailyAgendaCriteria,
        order: OrderBy,
        page: Page,
    ) -> StoreResult<Vec<DailyAgenda>>;
    async fn count(&self, criteria: &DailyAgendaCriteria) -> StoreResult<i64>;
    async fn query_by_id(&self, id: Uuid) -> StoreResult<DailyAgenda>;
    async fn query_by_business_date(
        &self,
        business_id: Uuid,
        date: NaiveDate,
    ) -> StoreResult<DailyAgenda>;
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    fn with_transaction(&self, tx: &Tx) -> Arc<dyn AppointmentStore>;

    async fn create(&self, appointment: &Appointment) -> StoreResult<()>;
    async fn update(&self, appointment: &Appointment) -> StoreResult<()>;
    async fn delete(&self, id: Uuid) -> StoreResult<()>;
    async fn query(
        &self,
        filter: &AppointmentFilter,
        order: OrderBy,
        page: Page,
    ) -> StoreResult<Vec<Appointment>>;
    async fn count(&self, filter: &AppointmentFilter) -> StoreResult<i64>;
    async fn query_by_id(&self, id: Uuid) -> StoreResult<Appointment>;
    async fn query_by_user_id(
        &self,
        user_id: Uuid,
        order: OrderBy,
        page: Page,
    ) -> StoreResult<Vec<Appointment>>;
    async fn query_by_business_id(
        &self,
        business_id: Uuid,
        order: OrderBy,
        page: Page,
    ) -> StoreResult<Vec<Appointment>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    fn with_transaction(&self, tx: &Tx) -> Arc<dyn UserStore>;

    async fn create(&self, user: &User) -> StoreResult<()>;
    async fn update(&self, user: &User) -> StoreResult<()>;
    async fn delete(&self, id: Uuid) -> StoreResult<()>;
    async fn query(&self, filter: &UserFilter, order: OrderBy, page: Page)
        -> StoreResult<Vec<User>>;
    async fn count(&self, filter: &UserFilter) -> StoreResult<i64>;
    async fn query_by_id(&self, id: Uuid) -> StoreResult<User>;
    async fn query_by_email(&self, email: &str) -> StoreResult<User>;
}

#[async_trait]
pub trait BusinessStore: Send + Sync {
    fn with_transaction(&self, tx: &Tx) -> Arc<dyn BusinessStore>;

    async fn create(&self, business: &Business) -> StoreResult<()>;
    async fn update(&self, business: &Business) -> StoreResult<()>;
    async fn delete(&self, id: Uuid) -> StoreResult<()>;
    async fn query(
        &self,
        filter: &BusinessFilter,
        order: OrderBy,
        page: Page,
    ) -> StoreResult<Vec<Business>>;
    async fn count(&self, filter: &BusinessFilter) -> StoreResult<i64>;
    async fn query_by_id(&self, id: Uuid) -> StoreResult<Business>;
}

/// Outcome of a failed reminder attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Rescheduled,
    Dead,
    /// The task was replaced or removed while it was being processed.
    Superseded,
}

/// Delayed task queue holding one reminder per appointment.
#[async_trait]
pub trait ReminderQueue: Send + Sync {
    /// Inserts the task or replaces an existing one with the same id,
    /// resetting its attempts and status.
    async fn enqueue(
        &self,
        id: Uuid,
        fire_at: DateTime<Utc>,
        payload: &ReminderPayload,
        timeout_seconds: i64,
    ) -> StoreResult<()>;

    /// Removes the task whatever its status, so finished rows do not outlive
    /// their appointment. Absent tasks are not an error.
    async fn cancel(&self, id: Uuid) -> StoreResult<()>;

    async fn get(&self, id: Uuid) -> StoreResult<ReminderTask>;

    /// Claims up to `limit` due tasks, including ones whose lease expired.
    async fn claim_due(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<ReminderTask>>;

    /// Marks a claimed task as delivered. Returns false when the task was
    /// replaced or removed in the meantime.
    async fn complete(&self, task: &ReminderTask) -> StoreResult<bool>;

    async fn fail(
        &self,
        task: &ReminderTask,
        error: &str,
        retry_at: DateTime<Utc>,
        max_attempts: i64,
    ) -> StoreResult<RetryOutcome>;
}
