//! Persistence layer: store contracts, their SQLite repositories and the
//! transaction handle shared between them.

use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

pub mod models;
pub mod repository;
pub mod store;

pub use store::*;

/// How long a connection waits for another writer before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for the database file at `path`.
pub fn connect_options(path: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT)
}

fn finished() -> sqlx::Error {
    sqlx::Error::Protocol("transaction already finished".to_string())
}

// ============================================================================
// Transactions
// ============================================================================

/// Handle to an open database transaction.
///
/// The transaction starts with `BEGIN IMMEDIATE`, so it owns the write lock
/// from its first statement and concurrent transactions queue behind it
/// instead of failing when a read turns into a write.
///
/// Clones share the same transaction, which lets several stores be bound to
/// one unit of work. Statements on the handle run one at a time. If the last
/// handle is dropped without `commit`, the transaction is rolled back.
#[derive(Clone)]
pub struct Tx {
    inner: Arc<Mutex<TxConn>>,
}

struct TxConn(Option<PoolConnection<Sqlite>>);

impl Drop for TxConn {
    fn drop(&mut self) {
        let Some(conn) = self.0.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = roll_back(conn).await {
                        tracing::warn!("Failed to roll back abandoned transaction: {}", e);
                    }
                });
            }
            // Closing the connection discards the open transaction.
            Err(_) => drop(conn.detach()),
        }
    }
}

/// Rolls back and returns the connection to the pool. A connection that
/// cannot roll back is closed instead of being reused.
async fn roll_back(mut conn: PoolConnection<Sqlite>) -> Result<(), sqlx::Error> {
    match sqlx::query("ROLLBACK").execute(&mut *conn).await {
        Ok(_) => Ok(()),
        Err(e) => {
            drop(conn.detach());
            Err(e)
        }
    }
}

impl Tx {
    pub async fn begin(pool: &SqlitePool) -> Result<Self, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(Tx {
            inner: Arc::new(Mutex::new(TxConn(Some(conn)))),
        })
    }

    pub async fn commit(self) -> Result<(), sqlx::Error> {
        let mut conn = self.take().await?;
        if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
            if let Err(rollback_err) = roll_back(conn).await {
                tracing::warn!("Rollback after failed commit failed: {}", rollback_err);
            }
            return Err(e);
        }
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), sqlx::Error> {
        let conn = self.take().await?;
        roll_back(conn).await
    }

    async fn take(&self) -> Result<PoolConnection<Sqlite>, sqlx::Error> {
        self.inner.lock().await.0.take().ok_or_else(finished)
    }
}

/// Where a repository sends its statements: straight to the pool
/// (auto-commit) or into a shared transaction.
#[derive(Clone)]
pub enum Exec {
    Pool(SqlitePool),
    Tx(Tx),
}

impl Exec {
    pub async fn acquire(&self) -> Result<Conn<'_>, sqlx::Error> {
        match self {
            Exec::Pool(pool) => Ok(Conn::Pooled(pool.acquire().await?)),
            Exec::Tx(tx) => {
                let guard = tx.inner.lock().await;
                MutexGuard::try_map(guard, |slot| slot.0.as_mut())
                    .map(Conn::Tx)
                    .map_err(|_| finished())
            }
        }
    }
}

impl From<&Tx> for Exec {
    fn from(tx: &Tx) -> Self {
        Exec::Tx(tx.clone())
    }
}

pub enum Conn<'a> {
    Pooled(PoolConnection<Sqlite>),
    Tx(MappedMutexGuard<'a, PoolConnection<Sqlite>>),
}

impl Deref for Conn<'_> {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        match self {
            Conn::Pooled(conn) => &**conn,
            Conn::Tx(tx) => &***tx,
        }
    }
}

impl DerefMut for Conn<'_> {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        match self {
            Conn::Pooled(conn) => &mut **conn,
            Conn::Tx(tx) => &mut ***tx,
        }
    }
}

// ============================================================================
// Query building
// ============================================================================

/// Appends `expr` as the next WHERE/AND condition.
pub(crate) fn push_condition<'q, 'args>(
    qb: &'q mut QueryBuilder<'args, Sqlite>,
    has_where: &mut bool,
    expr: &str,
) -> &'q mut QueryBuilder<'args, Sqlite> {
    qb.push(if *has_where { " AND " } else { " WHERE " });
    *has_where = true;
    qb.push(expr)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let pool = testing::memory_pool().await;

        let tx = Tx::begin(&pool).await.unwrap();
        {
            let exec = Exec::from(&tx);
            let mut conn = exec.acquire().await.unwrap();
            sqlx::query("CREATE TABLE scratch (v INTEGER)")
                .execute(&mut *conn)
                .await
                .unwrap();
        }
        drop(tx);

        let exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'scratch'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(exists, 0);
    }

    async fn insert_scratch(tx: &Tx, v: i64) -> Result<(), sqlx::Error> {
        let exec = Exec::from(tx);
        let mut conn = exec.acquire().await?;
        sqlx::query("INSERT INTO scratch (v) VALUES (?)")
            .bind(v)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_transactions_wait_for_the_writer() {
        let (pool, _dir) = testing::file_pool(2).await;
        sqlx::query("CREATE TABLE scratch (v INTEGER)")
            .execute(&pool)
            .await
            .unwrap();

        let first = Tx::begin(&pool).await.unwrap();
        insert_scratch(&first, 1).await.unwrap();

        let second = tokio::spawn({
            let pool = pool.clone();
            async move {
                let tx = Tx::begin(&pool).await?;
                insert_scratch(&tx, 2).await?;
                tx.commit().await
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!second.is_finished());

        first.commit().await.unwrap();
        second.await.unwrap().unwrap();

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scratch")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[tokio::test]
    async fn finished_transaction_rejects_statements() {
        let pool = testing::memory_pool().await;
        let tx = Tx::begin(&pool).await.unwrap();
        let exec = Exec::from(&tx);
        tx.commit().await.unwrap();

        assert!(exec.acquire().await.is_err());
    }
}
