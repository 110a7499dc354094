//! Platform-facing reads over the ledger: checkout links, history, status and
//! admin reporting. None of this is part of the processor protocol.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use serde::Serialize;

use crate::clock::Clock;
use crate::config::MerchantConfig;
use crate::domain::{to_major_units, Course, LedgerEntry, TransactionState};
use crate::error::AppError;
use crate::ports::{CourseCatalog, LedgerFilter, TransactionLedger, UserDirectory};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// Reporting window, counted back from now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Week,
    Month,
    Year,
    All,
}

impl Period {
    pub fn as_str(self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
            Period::All => "all",
        }
    }

    /// Lower `create_time` bound for this window, `None` for all time.
    pub fn since(self, now_millis: i64) -> Option<i64> {
        let days = match self {
            Period::Day => 1,
            Period::Week => 7,
            Period::Month => 30,
            Period::Year => 365,
            Period::All => return None,
        };
        Some(now_millis - days * DAY_MILLIS)
    }
}

impl FromStr for Period {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "year" => Ok(Period::Year),
            "all" | "" => Ok(Period::All),
            other => Err(AppError::Validation(format!(
                "unknown period '{other}', expected day, week, month, year or all"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStats {
    pub total_transactions: i64,
    pub successful_payments: i64,
    pub cancelled_payments: i64,
    /// Major units.
    pub total_revenue: BigDecimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTransactionView {
    pub id: i64,
    pub transaction_id: String,
    pub course_id: i64,
    pub course_title: Option<String>,
    pub amount: BigDecimal,
    pub state: &'static str,
    pub create_time: i64,
    pub perform_time: Option<i64>,
    pub cancel_time: Option<i64>,
    pub reason: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatusView {
    pub transaction_id: String,
    pub state: &'static str,
    pub status_message: &'static str,
    pub amount: BigDecimal,
    pub course_id: i64,
    pub course_title: Option<String>,
    pub create_time: i64,
    pub perform_time: Option<i64>,
    pub cancel_time: Option<i64>,
    pub reason: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminTransactionView {
    pub id: i64,
    pub transaction_id: String,
    pub state: &'static str,
    pub amount: BigDecimal,
    pub course_id: i64,
    pub course_title: Option<String>,
    pub user_id: i64,
    pub user_email: Option<String>,
    pub create_time: i64,
    pub perform_time: Option<i64>,
    pub cancel_time: Option<i64>,
    pub reason: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminTransactionPage {
    pub transactions: Vec<AdminTransactionView>,
    pub page: i64,
    pub size: i64,
}

/// Raw admin listing query, before defaults and clamping.
#[derive(Debug, Clone, Default)]
pub struct AdminQuery {
    pub status: Option<String>,
    pub period: Option<String>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

pub fn status_message(state: TransactionState) -> &'static str {
    match state {
        TransactionState::Initial => "Payment started",
        TransactionState::WaitingPay => "Waiting for payment",
        TransactionState::PayAccepted => "Payment completed successfully",
        TransactionState::CancelledWhileWaiting => "Payment cancelled",
        TransactionState::CancelledAfterSuccessful => "Payment cancelled after completion",
    }
}

#[derive(Clone)]
pub struct ReportingService {
    courses: Arc<dyn CourseCatalog>,
    users: Arc<dyn UserDirectory>,
    ledger: Arc<dyn TransactionLedger>,
    clock: Arc<dyn Clock>,
    merchant_id: String,
    checkout_url: String,
    return_url: String,
}

impl ReportingService {
    pub fn new(
        config: &MerchantConfig,
        courses: Arc<dyn CourseCatalog>,
        users: Arc<dyn UserDirectory>,
        ledger: Arc<dyn TransactionLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            courses,
            users,
            ledger,
            clock,
            merchant_id: config.merchant_id.clone(),
            checkout_url: config.checkout_url.clone(),
            return_url: config.return_url.clone(),
        }
    }

    /// Checkout redirect for one course purchase.
    pub async fn payment_url(&self, course_id: i64, user_id: i64) -> Result<String, AppError> {
        let course = self
            .courses
            .find_course(course_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Course {course_id}")))?;
        self.users
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {user_id}")))?;

        let amount = course.price_minor_units().ok_or_else(|| {
            AppError::Internal(format!("price of course {course_id} does not fit minor units"))
        })?;

        let mut url = url::Url::parse(&self.checkout_url)
            .map_err(|e| AppError::Internal(format!("checkout url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("m", &self.merchant_id)
            .append_pair("ac.course_id", &course_id.to_string())
            .append_pair("ac.user_id", &user_id.to_string())
            .append_pair("a", &amount.to_string())
            .append_pair("c", &self.return_url);

        Ok(url.into())
    }

    pub async fn stats(&self, period: Option<&str>) -> Result<PaymentStats, AppError> {
        let period = period.map(Period::from_str).transpose()?;
        let since = period.and_then(|p| p.since(self.clock.now_millis()));
        let stats = self.ledger.stats(since).await?;

        Ok(PaymentStats {
            total_transactions: stats.total,
            successful_payments: stats.accepted,
            cancelled_payments: stats.cancelled_after_success,
            total_revenue: to_major_units(stats.accepted_amount),
            period: period.map(Period::as_str),
        })
    }

    pub async fn user_transactions(
        &self,
        user_id: i64,
    ) -> Result<Vec<UserTransactionView>, AppError> {
        let entries = self.ledger.list_for_user(user_id).await?;
        let titles = self.course_titles(&entries).await?;

        Ok(entries
            .into_iter()
            .map(|entry| UserTransactionView {
                id: entry.id,
                course_title: titles.get(&entry.account.course_id).cloned(),
                course_id: entry.account.course_id,
                amount: to_major_units(entry.amount),
                state: entry.state.name(),
                create_time: entry.create_time,
                perform_time: entry.perform_time,
                cancel_time: entry.cancel_time,
                reason: entry.reason,
                transaction_id: entry.external_id,
            })
            .collect())
    }

    pub async fn transaction_status(
        &self,
        external_id: &str,
    ) -> Result<TransactionStatusView, AppError> {
        let entry = self
            .ledger
            .find(external_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {external_id}")))?;
        let course = self.courses.find_course(entry.account.course_id).await?;

        Ok(TransactionStatusView {
            state: entry.state.name(),
            status_message: status_message(entry.state),
            amount: to_major_units(entry.amount),
            course_id: entry.account.course_id,
            course_title: course.map(|c| c.title),
            create_time: entry.create_time,
            perform_time: entry.perform_time,
            cancel_time: entry.cancel_time,
            reason: entry.reason,
            transaction_id: entry.external_id,
        })
    }

    /// Newest first. An unrecognised status falls back to every state.
    pub async fn admin_transactions(
        &self,
        query: &AdminQuery,
    ) -> Result<AdminTransactionPage, AppError> {
        let state = query
            .status
            .as_deref()
            .filter(|s| !s.eq_ignore_ascii_case("all"))
            .and_then(TransactionState::from_name);
        let period = query.period.as_deref().map(Period::from_str).transpose()?;
        let filter = LedgerFilter {
            state,
            created_since: period.and_then(|p| p.since(self.clock.now_millis())),
        };

        let page = query.page.unwrap_or(0).max(0);
        let size = query
            .size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let offset = page
            .checked_mul(size)
            .ok_or_else(|| AppError::Validation(format!("page {page} is out of range")))?;

        let entries = self.ledger.list(&filter, size, offset).await?;
        let titles = self.course_titles(&entries).await?;
        let mut emails: HashMap<i64, Option<String>> = HashMap::new();
        for entry in &entries {
            let user_id = entry.account.user_id;
            if !emails.contains_key(&user_id) {
                let email = self.users.find_user(user_id).await?.map(|u| u.email);
                emails.insert(user_id, email);
            }
        }

        let transactions = entries
            .into_iter()
            .map(|entry| AdminTransactionView {
                id: entry.id,
                state: entry.state.name(),
                amount: to_major_units(entry.amount),
                course_id: entry.account.course_id,
                course_title: titles.get(&entry.account.course_id).cloned(),
                user_id: entry.account.user_id,
                user_email: emails.get(&entry.account.user_id).cloned().flatten(),
                create_time: entry.create_time,
                perform_time: entry.perform_time,
                cancel_time: entry.cancel_time,
                reason: entry.reason,
                transaction_id: entry.external_id,
            })
            .collect();

        Ok(AdminTransactionPage {
            transactions,
            page,
            size,
        })
    }

    async fn course_titles(&self, entries: &[LedgerEntry]) -> Result<HashMap<i64, String>, AppError> {
        let mut titles = HashMap::new();
        for entry in entries {
            let course_id = entry.account.course_id;
            if titles.contains_key(&course_id) {
                continue;
            }
            if let Some(Course { title, .. }) = self.courses.find_course(course_id).await? {
                titles.insert(course_id, title);
            }
        }
        Ok(titles)
    }
}
