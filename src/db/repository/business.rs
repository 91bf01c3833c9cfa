use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::db::models::*;
use crate::db::{push_condition, BusinessStore, Exec, StoreError, StoreResult, Tx};
use crate::query::{OrderBy, Page};

const COLUMNS: &str = "id, owner_id, name, description, date_created, date_updated";

// ============================================================================
// Business Repository
// ============================================================================

#[derive(Clone)]
pub struct BusinessRepository {
    exec: Exec,
}

impl BusinessRepository {
    pub fn new(pool: SqlitePool) -> Self {
        BusinessRepository {
            exec: Exec::Pool(pool),
        }
    }

    fn apply_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &BusinessFilter) {
        let mut has_where = false;
        if let Some(id) = filter.id {
            push_condition(qb, &mut has_where, "id = ").push_bind(id);
        }
        if let Some(owner_id) = filter.owner_id {
            push_condition(qb, &mut has_where, "owner_id = ").push_bind(owner_id);
        }
        if let Some(name) = &filter.name {
            push_condition(qb, &mut has_where, "name LIKE ").push_bind(format!("%{name}%"));
        }
    }
}

#[async_trait]
impl BusinessStore for BusinessRepository {
    fn with_transaction(&self, tx: &Tx) -> Arc<dyn BusinessStore> {
        Arc::new(BusinessRepository { exec: tx.into() })
    }

    async fn create(&self, business: &Business) -> StoreResult<()> {
        let mut conn = self.exec.acquire().await?;
        sqlx::query(
            r#"
            INSERT INTO businesses (id, owner_id, name, description, date_created, date_updated)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(business.id)
        .bind(business.owner_id)
        .bind(&business.name)
        .bind(&business.description)
        .bind(business.date_created)
        .bind(business.date_updated)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn update(&self, business: &Business) -> StoreResult<()> {
        let mut conn = self.exec.acquire().await?;
        let result = sqlx::query(
            "UPDATE businesses SET name = ?, description = ?, date_updated = ? WHERE id = ?",
        )
        .bind(&business.name)
        .bind(&business.description)
        .bind(business.date_updated)
        .bind(business.id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let mut conn = self.exec.acquire().await?;
        let result = sqlx::query("DELETE FROM businesses WHERE id = ?")
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
        filter: &BusinessFilter,
        order: OrderBy,
        page: Page,
    ) -> StoreResult<Vec<Business>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM businesses"));
        Self::apply_filter(&mut qb, filter);
        qb.push(" ORDER BY ")
            .push(order.field)
            .push(order.direction.sql());
        qb.push(" LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let mut conn = self.exec.acquire().await?;
        let rows = qb.build_query_as::<Business>().fetch_all(&mut *conn).await?;
        Ok(rows)
    }

    async fn count(&self, filter: &BusinessFilter) -> StoreResult<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM businesses");
        Self::apply_filter(&mut qb, filter);

        let mut conn = self.exec.acquire().await?;
        let count: i64 = qb.build_query_scalar().fetch_one(&mut *conn).await?;
        Ok(count)
    }

    async fn query_by_id(&self, id: Uuid) -> StoreResult<Business> {
        let mut conn = self.exec.acquire().await?;
        let business = sqlx::query_as::<_, Business>(&format!(
            "SELECT {COLUMNS} FROM businesses WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(StoreError::NotFound)?;
        Ok(business)
    }
}
