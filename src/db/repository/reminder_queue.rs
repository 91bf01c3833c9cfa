use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{task_status, ReminderPayload, ReminderTask};
use crate::db::{ReminderQueue, RetryOutcome, StoreError, StoreResult};

const COLUMNS: &str = "id, payload, fire_at, next_attempt_at, timeout_seconds, status, attempts, \
                       lease_until, last_error, delivered_at, created_at, updated_at";

/// Persistent reminder queue.
///
/// - Enqueue is an upsert keyed by appointment id, so rescheduling replaces the
///   pending task.
/// - Cancelling removes the row whatever its status, delivered and dead
///   tasks included.
/// - Claiming picks one due candidate, then flips it to 'processing' with a
///   guarded UPDATE. A candidate taken by another worker in between is skipped.
/// - Completion and failure are guarded by the lease the worker claimed with;
///   a task replaced or cancelled mid-flight is left alone.
#[derive(Clone)]
pub struct ReminderQueueRepository {
    pool: SqlitePool,
}

impl ReminderQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReminderQueueRepository { pool }
    }
}

#[async_trait]
impl ReminderQueue for ReminderQueueRepository {
    async fn enqueue(
        &self,
        id: Uuid,
        fire_at: DateTime<Utc>,
        payload: &ReminderPayload,
        timeout_seconds: i64,
    ) -> StoreResult<()> {
        let payload = serde_json::to_string(payload)
            .map_err(|e| StoreError::Internal(format!("encoding reminder payload: {e}")))?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO reminder_tasks (
                id, payload, fire_at, next_attempt_at, timeout_seconds,
                status, attempts, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, 'pending', 0, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                payload = excluded.payload,
                fire_at = excluded.fire_at,
                next_attempt_at = excluded.next_attempt_at,
                timeout_seconds = excluded.timeout_seconds,
                status = 'pending',
                attempts = 0,
                lease_until = NULL,
                last_error = NULL,
                delivered_at = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(payload)
        .bind(fire_at)
        .bind(fire_at)
        .bind(timeout_seconds)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cancel(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM reminder_tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<ReminderTask> {
        let task = sqlx::query_as::<_, ReminderTask>(&format!(
            "SELECT {COLUMNS} FROM reminder_tasks WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;
        Ok(task)
    }

    async fn claim_due(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<ReminderTask>> {
        let mut tasks = Vec::new();
        if limit <= 0 {
            return Ok(tasks);
        }

        let mut skipped = 0;
        while (tasks.len() as i64) < limit && skipped < limit {
            let candidate: Option<(Uuid, i64)> = sqlx::query_as(
                r#"
                SELECT id, timeout_seconds FROM reminder_tasks
                WHERE (status = 'pending' AND next_attempt_at <= ?)
                   OR (status = 'processing' AND lease_until <= ?)
                ORDER BY next_attempt_at ASC
                LIMIT 1
                "#,
            )
            .bind(now)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

            let Some((id, timeout_seconds)) = candidate else {
                break;
            };

            let lease_until = now + Duration::seconds(timeout_seconds.max(1));
            let claimed = sqlx::query_as::<_, ReminderTask>(&format!(
                r#"
                UPDATE reminder_tasks
                SET status = 'processing', lease_until = ?, updated_at = ?
                WHERE id = ?
                  AND ((status = 'pending' AND next_attempt_at <= ?)
                    OR (status = 'processing' AND lease_until <= ?))
                RETURNING {COLUMNS}
                "#
            ))
            .bind(lease_until)
            .bind(now)
            .bind(id)
            .bind(now)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

            match claimed {
                Some(task) => tasks.push(task),
                None => skipped += 1,
            }
        }

        Ok(tasks)
    }

    async fn complete(&self, task: &ReminderTask) -> StoreResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE reminder_tasks
            SET status = ?, delivered_at = ?, lease_until = NULL, updated_at = ?
            WHERE id = ? AND status = 'processing' AND lease_until = ?
            "#,
        )
        .bind(task_status::DONE)
        .bind(now)
        .bind(now)
        .bind(task.id)
        .bind(task.lease_until)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn fail(
        &self,
        task: &ReminderTask,
        error: &str,
        retry_at: DateTime<Utc>,
        max_attempts: i64,
    ) -> StoreResult<RetryOutcome> {
        let now = Utc::now();
        let status: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE reminder_tasks
            SET attempts = attempts + 1,
                last_error = ?,
                next_attempt_at = ?,
                lease_until = NULL,
                status = CASE WHEN attempts + 1 >= ? THEN 'dead' ELSE 'pending' END,
                updated_at = ?
            WHERE id = ? AND status = 'processing' AND lease_until = ?
            RETURNING status
            "#,
        )
        .bind(error)
        .bind(retry_at)
        .bind(max_attempts)
        .bind(now)
        .bind(task.id)
        .bind(task.lease_until)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match status.as_deref() {
            None => RetryOutcome::Superseded,
            Some(task_status::DEAD) => RetryOutcome::Dead,
            Some(_) => RetryOutcome::Rescheduled,
        })
    }
}
