use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::db::models::*;
use crate::db::{push_condition, Exec, GeneralAgendaStore, StoreError, StoreResult, Tx};
use crate::query::{OrderBy, Page};

const COLUMNS: &str = "id, business_id, opens_at, closed_at, interval_seconds, working_days, \
                       timezone, date_created, date_updated";

// ============================================================================
// General Agenda Repository
// ============================================================================

#[derive(Clone)]
pub struct GeneralAgendaRepository {
    exec: Exec,
}

impl GeneralAgendaRepository {
    pub fn new(pool: SqlitePool) -> Self {
        GeneralAgendaRepository {
            exec: Exec::Pool(pool),
        }
    }

    fn apply_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &GeneralAgendaFilter) {
        let mut has_where = false;
        if let Some(id) = filter.id {
            push_condition(qb, &mut has_where, "id = ").push_bind(id);
        }
        if let Some(business_id) = filter.business_id {
            push_condition(qb, &mut has_where, "business_id = ").push_bind(business_id);
        }
    }

    async fn fetch_one(&self, column: &str, value: Uuid) -> StoreResult<GeneralAgenda> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM general_agendas"));
        let mut has_where = false;
        push_condition(&mut qb, &mut has_where, column).push_bind(value);

        let mut conn = self.exec.acquire().await?;
        let row = qb
            .build_query_as::<GeneralAgendaRow>()
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(StoreError::NotFound)?;
        GeneralAgenda::try_from(row)
    }
}

#[async_trait]
impl GeneralAgendaStore for GeneralAgendaRepository {
    fn with_transaction(&self, tx: &Tx) -> Arc<dyn GeneralAgendaStore> {
        Arc::new(GeneralAgendaRepository { exec: tx.into() })
    }

    async fn create(&self, agenda: &GeneralAgenda) -> StoreResult<()> {
        let row = GeneralAgendaRow::from(agenda);
        let mut conn = self.exec.acquire().await?;
        sqlx::query(
            r#"
            INSERT INTO general_agendas (
                id, business_id, opens_at, closed_at, interval_seconds,
                working_days, timezone, date_created, date_updated
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.id)
        .bind(row.business_id)
        .bind(row.opens_at)
        .bind(row.closed_at)
        .bind(row.interval_seconds)
        .bind(row.working_days)
        .bind(row.timezone)
        .bind(row.date_created)
        .bind(row.date_updated)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn update(&self, agenda: &GeneralAgenda) -> StoreResult<()> {
        let row = GeneralAgendaRow::from(agenda);
        let mut conn = self.exec.acquire().await?;
        let result = sqlx::query(
            r#"
            UPDATE general_agendas
            SET opens_at = ?, closed_at = ?, interval_seconds = ?,
                working_days = ?, timezone = ?, date_updated = ?
            WHERE id = ?
            "#,
        )
        .bind(row.opens_at)
        .bind(row.closed_at)
        .bind(row.interval_seconds)
        .bind(row.working_days)
        .bind(row.timezone)
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
        let result = sqlx::query("DELETE FROM general_agendas WHERE id = ?")
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
        filter: &GeneralAgendaFilter,
        order: OrderBy,
        page: Page,
    ) -> StoreResult<Vec<GeneralAgenda>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM general_agendas"));
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
            .build_query_as::<GeneralAgendaRow>()
            .fetch_all(&mut *conn)
            .await?;
        rows.into_iter().map(GeneralAgenda::try_from).collect()
    }

    async fn count(&self, filter: &GeneralAgendaFilter) -> StoreResult<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM general_agendas");
        Self::apply_filter(&mut qb, filter);

        let mut conn = self.exec.acquire().await?;
        let count: i64 = qb.build_query_scalar().fetch_one(&mut *conn).await?;
        Ok(count)
    }

    async fn query_by_id(&self, id: Uuid) -> StoreResult<GeneralAgenda> {
        self.fetch_one("id = ", id).await
    }

    async fn query_by_business_id(&self, business_id: Uuid) -> StoreResult<GeneralAgenda> {
        self.fetch_one("business_id = ", business_id).await
    }
}
