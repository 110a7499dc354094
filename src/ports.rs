//! Storage and collaborator interfaces.
//!
//! The merchant handler only sees these traits. Course and user data belong to
//! the rest of the platform; the ledger belongs to this service.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Course, LedgerEntry, NewLedgerEntry, Notification, TransactionState, User};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("conflicting record: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait CourseCatalog: Send + Sync {
    async fn find_course(&self, course_id: i64) -> RepositoryResult<Option<Course>>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: i64) -> RepositoryResult<Option<User>>;
    async fn is_enrolled(&self, user_id: i64, course_id: i64) -> RepositoryResult<bool>;
}

/// Filter for the paginated admin listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerFilter {
    pub state: Option<TransactionState>,
    /// Only entries with `create_time >= created_since`.
    pub created_since: Option<i64>,
}

/// Aggregate counters over the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub total: i64,
    pub accepted: i64,
    pub cancelled_after_success: i64,
    /// Sum of accepted amounts, minor units.
    pub accepted_amount: i64,
}

#[async_trait]
pub trait TransactionLedger: Send + Sync {
    async fn ping(&self) -> RepositoryResult<()>;

    async fn find(&self, external_id: &str) -> RepositoryResult<Option<LedgerEntry>>;

    /// Entries with `from <= create_time <= to`, oldest first.
    async fn statement(&self, from: i64, to: i64) -> RepositoryResult<Vec<LedgerEntry>>;

    /// Entries for one user, newest first.
    async fn list_for_user(&self, user_id: i64) -> RepositoryResult<Vec<LedgerEntry>>;

    /// Filtered entries, newest first.
    async fn list(
        &self,
        filter: &LedgerFilter,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<LedgerEntry>>;

    async fn stats(&self, created_since: Option<i64>) -> RepositoryResult<LedgerStats>;

    /// Open an atomic unit over the ledger and the enrollment side effects.
    async fn begin(&self) -> RepositoryResult<Box<dyn UnitOfWork>>;
}

/// Everything read or written here commits together or not at all.
/// Dropping the unit without calling `commit` rolls it back.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Read an entry and hold it against concurrent writers until the unit ends.
    async fn lock(&mut self, external_id: &str) -> RepositoryResult<Option<LedgerEntry>>;

    /// Insert-if-absent. `None` when an entry with the same external id exists.
    async fn insert(&mut self, entry: NewLedgerEntry) -> RepositoryResult<Option<LedgerEntry>>;

    async fn save(&mut self, entry: &LedgerEntry) -> RepositoryResult<()>;

    /// Also holds the user's purchases against concurrent writers until the unit ends.
    async fn is_enrolled(&mut self, user_id: i64, course_id: i64) -> RepositoryResult<bool>;

    async fn find_course(&mut self, course_id: i64) -> RepositoryResult<Option<Course>>;

    async fn find_user(&mut self, user_id: i64) -> RepositoryResult<Option<User>>;

    /// Add membership and bump the course enrollment count.
    async fn enroll(&mut self, user_id: i64, course_id: i64) -> RepositoryResult<()>;

    /// Drop membership and decrement the enrollment count, never below zero.
    async fn unenroll(&mut self, user_id: i64, course_id: i64) -> RepositoryResult<()>;

    async fn queue_notification(&mut self, notification: &Notification) -> RepositoryResult<()>;

    async fn commit(self: Box<Self>) -> RepositoryResult<()>;
}
