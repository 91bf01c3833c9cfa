use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of a queued reminder: 'pending' -> 'processing' -> 'done', with
/// failed attempts going back to 'pending' until they land in 'dead'.
pub mod task_status {
    pub const PENDING: &str = "pending";
    pub const PROCESSING: &str = "processing";
    pub const DONE: &str = "done";
    pub const DEAD: &str = "dead";
}

/// Delayed reminder keyed by the appointment it belongs to.
///
/// `fire_at` is the instant the reminder becomes due; `next_attempt_at`
/// starts equal to it and moves forward on retries. While a worker holds the
/// task, `lease_until` bounds how long it may keep it before another worker
/// reclaims it.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ReminderTask {
    /// Appointment id.
    pub id: Uuid,

    /// JSON-encoded [`ReminderPayload`].
    pub payload: String,

    pub fire_at: DateTime<Utc>,
    pub next_attempt_at: DateTime<Utc>,

    /// Processing timeout in seconds, also used as lease length.
    pub timeout_seconds: i64,

    pub status: String,
    pub attempts: i64,
    pub lease_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPayload {
    pub user_id: Uuid,
}
