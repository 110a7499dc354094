//! Plain value objects handed out by the course and user collaborators.

use bigdecimal::{BigDecimal, ToPrimitive};
use serde::{Deserialize, Serialize};

/// Minor units per major currency unit.
pub const MINOR_UNITS: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub title: String,
    /// Price in major units, exact.
    pub price: BigDecimal,
    pub enrollment_count: i32,
}

impl Course {
    /// Price converted to minor units without going through floating point.
    /// `None` when the value does not fit an `i64`.
    pub fn price_minor_units(&self) -> Option<i64> {
        to_minor_units(&self.price)
    }
}

pub fn to_minor_units(major: &BigDecimal) -> Option<i64> {
    (major.clone() * BigDecimal::from(MINOR_UNITS)).round(0).to_i64()
}

pub fn to_major_units(minor: i64) -> BigDecimal {
    BigDecimal::new(minor.into(), 2)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Success,
    Warning,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Success => "SUCCESS",
            NotificationKind::Warning => "WARNING",
        }
    }
}

/// In-app notification queued alongside a ledger transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: i64,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
}
