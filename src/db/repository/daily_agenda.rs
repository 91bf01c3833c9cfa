use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::db::models::*;
use crate::db::{push_condition, DailyAgendaStore, Exec, StoreError, StoreResult, Tx};
use crate::query::{OrderBy, Page};

const COLUMNS: &str = "id, business_id, applicable_date, opens_at, closed_at, interval_seconds, \
                       availability, date_created, date_updated";

// ============================================================================
// Daily Agenda Repository
// ============================================================================

#[derive(Clone)]
pub struct DailyAgendaRepository {
    exec: Exec,
}

impl DailyAgendaRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DailyAgendaRepository {
            exec: Exec::Pool(pool),
        }
    }

    fn apply_criteria(qb: &mut QueryBuilder<'_, Sqlite>, criteria: &DailyAgendaCriteria) {
        let mut has_where = false;
        if let Some(id) = criteria.id {
            push_condition(qb, &mut has_where, "id = ").push_bind(id);
        }
        if let Some(business_id) = criteria.business_id {
            push_condition(qb, &mut has_where, "business_id = ").push_bind(business_id);
        }
        match criteria.dates {
            DateRange::On(date) => {
                push_condition(qb, &mut has_where, "applicable_date = ").push_bind(date);
            }
            DateRange::Between(from, to) => {
                push_condition(qb, &mut has_where, "applicable_date BETWEEN ")
                    .push_bind(from)
                    .push(" AND ")
                    .push_bind(to);
            }
            DateRange::OnOrAfter(date) => {
                push_condition(qb, &mut has_where, "applicable_date >= ").push_bind(date);
            }
        }
    }

    async fn fetch_optional(&self, qb: &mut QueryBuilder<'_, Sqlite>) -> StoreResult<DailyAgenda> {
        let mut conn = self.exec.acquire().await?;
        let row = qb
            .build_query_as::<DailyAgendaRow>()
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(StoreError::NotFound)?;
        DailyAgenda::try_from(row)
    }
}

#[async_trait]
impl DailyAgendaStore for DailyAgendaRepository {
    fn with_transaction(&self, tx: &Tx) -> Arc<dyn DailyAgendaStore> {
        Arc::new(DailyAgendaRepository { exec: tx.into() })
    }

    async fn create(&self, agenda: &DailyAgenda) -> StoreResult<()> {
        let row = DailyAgendaRow::from(agenda);
        let mut conn = self.exec.acquire().await?;
        sqlx::query(
            r#"
            INSERT INTO daily_agendas (
                id, business_id, applicable_date, opens_at, closed_at,
                interval_seconds, availability, date_created, date_updated
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.id)
        .bind(row.business_id)
        .bind(row.applicable_date)
        .bind(row.opens_at)
        .bind(row.closed_at)
        .bind(row.interval_seconds)
        .bind(row.availability)
        .bind(row.date_created)
        .bind(row.date_updated)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn update(&self, agenda: &DailyAgenda) -> StoreResult<()> {
        let row = DailyAgendaRow::from(agenda);
        let mut conn = self.exec.acquire().await?;
        let result = sqlx::query(
            r#"
            UPDATE daily_agendas
            SET opens_at = ?, closed_at = ?, interval_seconds = ?,
                availability = ?, date_updated = ?
            WHERE id = ?
            "#,
        )
        .bind(row.opens_at)
        .bind(row.closed_at)
        .bind(row.interval_seconds)
        .bind(row.availability)
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
        let result = sqlx::query("DELETE FROM daily_agendas WHERE id = ?")
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
        criteria: &DailyAgendaCriteria,
        order: OrderBy,
        page: Page,
    ) -> StoreResult<Vec<DailyAgenda>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM daily_agendas"));
        Self::apply_criteria(&mut qb, criteria);
        qb.push(" ORDER BY ")
            .push(order.field)
            .push(order.direction.sql());
        qb.push(" LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let mut conn = self.exec.acquire().await?;
        let rows = qb
            .build_query_as::<DailyAgendaRow>()
            .fetch_all(&mut *conn)
            .await?;
        rows.into_iter().map(DailyAgenda::try_from).collect()
    }

    async fn count(&self, criteria: &DailyAgendaCriteria) -> StoreResult<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM daily_agendas");
        Self::apply_criteria(&mut qb, criteria);

        let mut conn = self.exec.acquire().await?;
        let count: i64 = qb.build_query_scalar().fetch_one(&mut *conn).await?;
        Ok(count)
    }

    async fn query_by_id(&self, id: Uuid) -> StoreResult<DailyAgenda> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {COLUMNS} FROM daily_agendas WHERE id = "
        ));
        qb.push_bind(id);
        self.fetch_optional(&mut qb).await
    }

    async fn query_by_business_date(
        &self,
        business_id: Uuid,
        date: NaiveDate,
    ) -> StoreResult<DailyAgenda> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {COLUMNS} FROM daily_agendas WHERE business_id = "
        ));
        qb.push_bind(business_id)
            .push(" AND applicable_date = ")
            .push_bind(date);
        self.fetch_optional(&mut qb).await
    }
}
