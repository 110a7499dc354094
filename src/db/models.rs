use chrono::{DateTime, Utc};
use sqlx::types::BigDecimal;
use sqlx::FromRow;

use crate::domain::{Account, Course, LedgerEntry, TransactionState, User};
use crate::ports::RepositoryError;

/// Row shape of `merchant_transactions`. Not exposed outside the storage layer.
#[derive(Debug, FromRow)]
pub struct LedgerRow {
    pub id: i64,
    pub external_id: String,
    pub gateway_time: i64,
    pub amount: i64,
    pub course_id: i64,
    pub user_id: i64,
    pub state: i32,
    pub create_time: i64,
    pub perform_time: Option<i64>,
    pub cancel_time: Option<i64>,
    pub reason: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerRow {
    pub fn into_domain(self) -> Result<LedgerEntry, RepositoryError> {
        let state = TransactionState::from_code(self.state).ok_or_else(|| {
            RepositoryError::Corrupt(format!(
                "transaction {} has unknown state code {}",
                self.external_id, self.state
            ))
        })?;

        Ok(LedgerEntry {
            id: self.id,
            external_id: self.external_id,
            gateway_time: self.gateway_time,
            amount: self.amount,
            account: Account::new(self.course_id, self.user_id),
            state,
            create_time: self.create_time,
            perform_time: self.perform_time,
            cancel_time: self.cancel_time,
            reason: self.reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct CourseRow {
    pub id: i64,
    pub title: String,
    pub price: BigDecimal,
    pub enrollment_count: i32,
}

impl From<CourseRow> for Course {
    fn from(row: CourseRow) -> Self {
        Course {
            id: row.id,
            title: row.title,
            price: row.price,
            enrollment_count: row.enrollment_count,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub first_name: Option<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            first_name: row.first_name,
        }
    }
}
