use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::db::models::*;
use crate::db::{push_condition, AppointmentStore, Exec, StoreError, StoreResult, Tx};
use crate::query::{OrderBy, Page};

const COLUMNS: &str =
    "id, business_id, user_id, status, scheduled_on, date_created, date_updated";

// ============================================================================
// Appointment Repository
// ============================================================================

#[derive(Clone)]
pub struct AppointmentRepository {
    exec: Exec,
}

impl AppointmentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AppointmentRepository {
            exec: Exec::Pool(pool),
        }
    }

    fn apply_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &AppointmentFilter) {
        let mut has_where = false;
        if let Some(id) = filter.id {
            push_condition(qb, &mut has_where, "id = ").push_bind(id);
        }
        if let Some(business_id) = filter.business_id {
            push_condition(qb, &mut has_where, "business_id = ").push_bind(business_id);
        }
        if let Some(user_id) = filter.user_id {
            push_condition(qb, &mut has_where, "user_id = ").push_bind(user_id);
        }
        if let Some(status) = filter.status {
            push_condition(qb, &mut has_where, "status = ").push_bind(status.code());
        }
        if let Some(scheduled_on) = filter.scheduled_on {
            push_condition(qb, &mut has_where, "scheduled_on = ").push_bind(scheduled_on);
        }
        if let Some(start) = filter.start_created_date {
            push_condition(qb, &mut has_where, "date_created >= ").push_bind(start);
        }
        if let Some(end) = filter.end_created_date {
            push_condition(qb, &mut has_where, "date_created <= ").push_bind(end);
        }
    }

    async fn fetch_page(
        &self,
        filter: &AppointmentFilter,
        order: OrderBy,
        page: Page,
    ) -> StoreResult<Vec<Appointment>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM appointments"));
        Self::apply_filter(&mut qb, filter);
        qb.push(" ORDER BY ")
            .push(order.field)
            .push(order.direction.sql());
        qb.push(" LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let mut conn = self.exec.acquire().await?;
        let rows = qb
            .build_query_as::<AppointmentRow>()
            .fetch_all(&mut *conn)
            .await?;
        rows.into_iter().map(Appointment::try_from).collect()
    }
}

#[async_trait]
impl AppointmentStore for AppointmentRepository {
    fn with_transaction(&self, tx: &Tx) -> Arc<dyn AppointmentStore> {
        Arc::new(AppointmentRepository { exec: tx.into() })
    }

    async fn create(&self, appointment: &Appointment) -> StoreResult<()> {
        let row = AppointmentRow::from(appointment);
        let mut conn = self.exec.acquire().await?;
        sqlx::query(
            r#"
            INSERT INTO appointments (
                id, business_id, user_id, status, scheduled_on, date_created, date_updated
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.id)
        .bind(row.business_id)
        .bind(row.user_id)
        .bind(row.status)
        .bind(row.scheduled_on)
        .bind(row.date_created)
        .bind(row.date_updated)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn update(&self, appointment: &Appointment) -> StoreResult<()> {
        let row = AppointmentRow::from(appointment);
        let mut conn = self.exec.acquire().await?;
        let result = sqlx::query(
            r#"
            UPDATE appointments
            SET status = ?, scheduled_on = ?, date_updated = ?
            WHERE id = ?
            "#,
        )
        .bind(row.status)
        .bind(row.scheduled_on)
        .bind(row.date_updated)
        .bind(row.id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let mut conn = self.exec.acquire().await?;
        let result = sqlx::query("DELETE FROM appointments WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn query(
        &self,
        filter: &AppointmentFilter,
        order: OrderBy,
        page: Page,
    ) -> StoreResult<Vec<Appointment>> {
        self.fetch_page(filter, order, page).await
    }

    async fn count(&self, filter: &AppointmentFilter) -> StoreResult<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM appointments");
        Self::apply_filter(&mut qb, filter);

        let mut conn = self.exec.acquire().await?;
        let count: i64 = qb.build_query_scalar().fetch_one(&mut *conn).await?;
        Ok(count)
    }

    async fn query_by_id(&self, id: Uuid) -> StoreResult<Appointment> {
        let mut conn = self.exec.acquire().await?;
        let row = sqlx::query_as::<_, AppointmentRow>(&format!(
            "SELECT {COLUMNS} FROM appointments WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(StoreError::NotFound)?;
        Appointment::try_from(row)
    }

    async fn query_by_user_id(
        &self,
        user_id: Uuid,
        order: OrderBy,
        page: Page,
    ) -> StoreResult<Vec<Appointment>> {
        let filter = AppointmentFilter {
            user_id: Some(user_id),
            ..Default::default()
        };
        self.fetch_page(&filter, order, page).await
    }

    async fn query_by_business_id(
        &self,
        business_id: Uuid,
        order: OrderBy,
        page: Page,
    ) -> StoreResult<Vec<Appointment>> {
        let filter = AppointmentFilter {
            business_id: Some(business_id),
            ..Default::default()
        };
        self.fetch_page(&filter, order, page).await
    }
}
