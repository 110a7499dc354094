//! Postgres implementation of every storage port.
//!
//! A unit of work is one SQL transaction. `lock` takes a row lock with
//! `FOR UPDATE`, so two calls for the same external id serialize on that row
//! while calls for different ids proceed in parallel.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use crate::db::models::{CourseRow, LedgerRow, UserRow};
use crate::domain::{Course, LedgerEntry, NewLedgerEntry, Notification, User};
use crate::ports::{
    CourseCatalog, LedgerFilter, LedgerStats, RepositoryError, RepositoryResult,
    TransactionLedger, UnitOfWork, UserDirectory,
};

const LEDGER_COLUMNS: &str = "id, external_id, gateway_time, amount, course_id, user_id, state, \
     create_time, perform_time, cancel_time, reason, created_at, updated_at";

fn into_entries(rows: Vec<LedgerRow>) -> RepositoryResult<Vec<LedgerEntry>> {
    rows.into_iter().map(LedgerRow::into_domain).collect()
}

/// Postgres-backed store for the ledger and the course/user collaborators.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CourseCatalog for PostgresStore {
    async fn find_course(&self, course_id: i64) -> RepositoryResult<Option<Course>> {
        let row = sqlx::query_as::<_, CourseRow>(
            "SELECT id, title, price, enrollment_count FROM courses WHERE id = $1",
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Course::from))
    }
}

#[async_trait]
impl UserDirectory for PostgresStore {
    async fn find_user(&self, user_id: i64) -> RepositoryResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, first_name FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn is_enrolled(&self, user_id: i64, course_id: i64) -> RepositoryResult<bool> {
        let enrolled = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM course_enrollments WHERE user_id = $1 AND course_id = $2)",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(enrolled)
    }
}

#[async_trait]
impl TransactionLedger for PostgresStore {
    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find(&self, external_id: &str) -> RepositoryResult<Option<LedgerEntry>> {
        let row = sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM merchant_transactions WHERE external_id = $1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(LedgerRow::into_domain).transpose()
    }

    async fn statement(&self, from: i64, to: i64) -> RepositoryResult<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM merchant_transactions \
             WHERE create_time >= $1 AND create_time <= $2 \
             ORDER BY create_time ASC, id ASC"
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        into_entries(rows)
    }

    async fn list_for_user(&self, user_id: i64) -> RepositoryResult<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM merchant_transactions \
             WHERE user_id = $1 ORDER BY create_time DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        into_entries(rows)
    }

    async fn list(
        &self,
        filter: &LedgerFilter,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM merchant_transactions \
             WHERE ($1::INTEGER IS NULL OR state = $1) \
             AND ($2::BIGINT IS NULL OR create_time >= $2) \
             ORDER BY create_time DESC, id DESC LIMIT $3 OFFSET $4"
        ))
        .bind(filter.state.map(|state| state.code()))
        .bind(filter.created_since)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        into_entries(rows)
    }

    async fn stats(&self, created_since: Option<i64>) -> RepositoryResult<LedgerStats> {
        let (total, accepted, cancelled_after_success, accepted_amount) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(*) FILTER (WHERE state = 3),
                    COUNT(*) FILTER (WHERE state = 5),
                    COALESCE(SUM(amount) FILTER (WHERE state = 3), 0)::BIGINT
                FROM merchant_transactions
                WHERE ($1::BIGINT IS NULL OR create_time >= $1)
                "#,
            )
            .bind(created_since)
            .fetch_one(&self.pool)
            .await?;

        Ok(LedgerStats {
            total,
            accepted,
            cancelled_after_success,
            accepted_amount,
        })
    }

    async fn begin(&self) -> RepositoryResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }
}

struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn lock(&mut self, external_id: &str) -> RepositoryResult<Option<LedgerEntry>> {
        let row = sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM merchant_transactions \
             WHERE external_id = $1 FOR UPDATE"
        ))
        .bind(external_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(LedgerRow::into_domain).transpose()
    }

    async fn insert(&mut self, entry: NewLedgerEntry) -> RepositoryResult<Option<LedgerEntry>> {
        let row = sqlx::query_as::<_, LedgerRow>(&format!(
            r#"
            INSERT INTO merchant_transactions (
                external_id, gateway_time, amount, course_id, user_id, state, create_time
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (external_id) DO NOTHING
            RETURNING {LEDGER_COLUMNS}
            "#
        ))
        .bind(&entry.external_id)
        .bind(entry.gateway_time)
        .bind(entry.amount)
        .bind(entry.account.course_id)
        .bind(entry.account.user_id)
        .bind(crate::domain::TransactionState::Initial.code())
        .bind(entry.create_time)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(LedgerRow::into_domain).transpose()
    }

    async fn save(&mut self, entry: &LedgerEntry) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE merchant_transactions
            SET state = $2, perform_time = $3, cancel_time = $4, reason = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(entry.id)
        .bind(entry.state.code())
        .bind(entry.perform_time)
        .bind(entry.cancel_time)
        .bind(entry.reason)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation()) {
                RepositoryError::Conflict(format!(
                    "another accepted purchase exists for {}",
                    entry.external_id
                ))
            } else {
                RepositoryError::Database(e)
            }
        })?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(entry.external_id.clone()));
        }
        Ok(())
    }

    async fn is_enrolled(&mut self, user_id: i64, course_id: i64) -> RepositoryResult<bool> {
        // Creates and performs for one user serialize on the user row. The
        // existence check runs as its own statement so it sees rows committed
        // while this one waited for the lock.
        sqlx::query("SELECT 1 FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;

        let enrolled = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM course_enrollments WHERE user_id = $1 AND course_id = $2)",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(enrolled)
    }

    async fn find_course(&mut self, course_id: i64) -> RepositoryResult<Option<Course>> {
        let row = sqlx::query_as::<_, CourseRow>(
            "SELECT id, title, price, enrollment_count FROM courses WHERE id = $1",
        )
        .bind(course_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Course::from))
    }

    async fn find_user(&mut self, user_id: i64) -> RepositoryResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, first_name FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(User::from))
    }

    async fn enroll(&mut self, user_id: i64, course_id: i64) -> RepositoryResult<()> {
        let inserted = sqlx::query(
            "INSERT INTO course_enrollments (user_id, course_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(course_id)
        .execute(&mut *self.tx)
        .await?;

        if inserted.rows_affected() == 1 {
            sqlx::query("UPDATE courses SET enrollment_count = enrollment_count + 1 WHERE id = $1")
                .bind(course_id)
                .execute(&mut *self.tx)
                .await?;
        }
        Ok(())
    }

    async fn unenroll(&mut self, user_id: i64, course_id: i64) -> RepositoryResult<()> {
        sqlx::query("DELETE FROM course_enrollments WHERE user_id = $1 AND course_id = $2")
            .bind(user_id)
            .bind(course_id)
            .execute(&mut *self.tx)
            .await?;

        sqlx::query(
            "UPDATE courses SET enrollment_count = GREATEST(enrollment_count - 1, 0) WHERE id = $1",
        )
        .bind(course_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn queue_notification(&mut self, notification: &Notification) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (user_id, kind, title, message, link)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(notification.user_id)
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.link)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
