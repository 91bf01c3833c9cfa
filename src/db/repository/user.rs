use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::db::models::*;
use crate::db::{push_condition, Exec, StoreError, StoreResult, Tx, UserStore};
use crate::query::{OrderBy, Page};

const COLUMNS: &str =
    "id, name, email, roles, password_hash, enabled, phone_no, date_created, date_updated";

// ============================================================================
// User Repository
// ============================================================================

#[derive(Clone)]
pub struct UserRepository {
    exec: Exec,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository {
            exec: Exec::Pool(pool),
        }
    }

    fn apply_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &UserFilter) {
        let mut has_where = false;
        if let Some(id) = filter.id {
            push_condition(qb, &mut has_where, "id = ").push_bind(id);
        }
        if let Some(name) = &filter.name {
            push_condition(qb, &mut has_where, "name LIKE ").push_bind(format!("%{name}%"));
        }
        if let Some(email) = &filter.email {
            push_condition(qb, &mut has_where, "email = ").push_bind(email.clone());
        }
        if let Some(enabled) = filter.enabled {
            push_condition(qb, &mut has_where, "enabled = ").push_bind(enabled);
        }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    fn with_transaction(&self, tx: &Tx) -> Arc<dyn UserStore> {
        Arc::new(UserRepository { exec: tx.into() })
    }

    async fn create(&self, user: &User) -> StoreResult<()> {
        let row = UserRow::from(user);
        let mut conn = self.exec.acquire().await?;
        sqlx::query(
            r#"
            INSERT INTO users (
                id, name, email, roles, password_hash, enabled, phone_no,
                date_created, date_updated
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.id)
        .bind(row.name)
        .bind(row.email)
        .bind(row.roles)
        .bind(row.password_hash)
        .bind(row.enabled)
        .bind(row.phone_no)
        .bind(row.date_created)
        .bind(row.date_updated)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn update(&self, user: &User) -> StoreResult<()> {
        let row = UserRow::from(user);
        let mut conn = self.exec.acquire().await?;
        let result = sqlx::query(
            r#"
            UPDATE users
            SET name = ?, email = ?, roles = ?, password_hash = ?, enabled = ?,
                phone_no = ?, date_updated = ?
            WHERE id = ?
            "#,
        )
        .bind(row.name)
        .bind(row.email)
        .bind(row.roles)
        .bind(row.password_hash)
        .bind(row.enabled)
        .bind(row.phone_no)
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
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
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
        filter: &UserFilter,
        order: OrderBy,
        page: Page,
    ) -> StoreResult<Vec<User>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM users"));
        Self::apply_filter(&mut qb, filter);
        qb.push(" ORDER BY ")
            .push(order.field)
            .push(order.direction.sql());
        qb.push(" LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let mut conn = self.exec.acquire().await?;
        let rows = qb.build_query_as::<UserRow>().fetch_all(&mut *conn).await?;
        rows.into_iter().map(User::try_from).collect()
    }

    async fn count(&self, filter: &UserFilter) -> StoreResult<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM users");
        Self::apply_filter(&mut qb, filter);

        let mut conn = self.exec.acquire().await?;
        let count: i64 = qb.build_query_scalar().fetch_one(&mut *conn).await?;
        Ok(count)
    }

    async fn query_by_id(&self, id: Uuid) -> StoreResult<User> {
        let mut conn = self.exec.acquire().await?;
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(StoreError::NotFound)?;
        User::try_from(row)
    }

    async fn query_by_email(&self, email: &str) -> StoreResult<User> {
        let mut conn = self.exec.acquire().await?;
        let row =
            sqlx::query_as::<_, UserRow>(&format!("SELECT {COLUMNS} FROM users WHERE email = ?"))
                .bind(email)
                .fetch_optional(&mut *conn)
                .await?
                .ok_or(StoreError::NotFound)?;
        User::try_from(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::testing::seed_user;
    use crate::db::testing::memory_pool;
    use crate::query::Direction;

    #[tokio::test]
    async fn email_and_phone_are_unique() {
        let pool = memory_pool().await;
        let repo = UserRepository::new(pool.clone());
        let user = seed_user(&pool, "ada@example.com", "+14155550100").await;

        let mut clash = user.clone();
        clash.id = Uuid::new_v4();
        clash.phone_no = PhoneNumber::parse("+14155550199").unwrap();
        assert_eq!(repo.create(&clash).await, Err(StoreError::Conflict));

        clash.email = "grace@example.com".to_string();
        clash.phone_no = user.phone_no.clone();
        assert_eq!(repo.create(&clash).await, Err(StoreError::Conflict));
    }

    #[tokio::test]
    async fn lookups_and_filters() {
        let pool = memory_pool().await;
        let repo = UserRepository::new(pool.clone());
        let ada = seed_user(&pool, "ada@example.com", "+14155550100").await;
        seed_user(&pool, "grace@example.com", "+14155550101").await;

        assert_eq!(repo.query_by_email("ada@example.com").await.unwrap(), ada);
        assert_eq!(repo.query_by_id(ada.id).await.unwrap(), ada);
        assert_eq!(
            repo.query_by_email("nobody@example.com").await,
            Err(StoreError::NotFound)
        );

        let filter = UserFilter {
            email: Some("grace@example.com".to_string()),
            ..Default::default()
        };
        assert_eq!(repo.count(&filter).await.unwrap(), 1);
        let all = repo
            .query(
                &UserFilter::default(),
                OrderBy::new("email", Direction::Asc),
                Page::new(1, 10).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].email, "ada@example.com");
    }
}
