use std::sync::Arc;

use super::error::MerchantError;
use super::protocol::{ReceiptDetail, ReceiptItem};
use crate::domain::{Account, Course, User};
use crate::ports::{CourseCatalog, UnitOfWork, UserDirectory};

/// Fiscal classification code for educational services.
pub const EDUCATION_SERVICE_CODE: &str = "62020900";
/// Unit-of-measure code for a single service item.
pub const EDUCATION_SERVICE_PACKAGE: &str = "796";
pub const VAT_PERCENT: u32 = 12;

/// Account resolution that passed every check.
#[derive(Debug, Clone)]
pub struct ValidatedPurchase {
    pub course: Course,
    pub user: User,
    pub price: i64,
}

impl ValidatedPurchase {
    pub fn detail(&self) -> ReceiptDetail {
        receipt_detail(&self.course, self.price)
    }
}

#[derive(Clone)]
pub struct AccountValidator {
    courses: Arc<dyn CourseCatalog>,
    users: Arc<dyn UserDirectory>,
}

impl AccountValidator {
    pub fn new(courses: Arc<dyn CourseCatalog>, users: Arc<dyn UserDirectory>) -> Self {
        Self { courses, users }
    }

    /// Course, then user, then existing enrollment, then amount.
    pub async fn validate(
        &self,
        account: &Account,
        amount: i64,
    ) -> Result<ValidatedPurchase, MerchantError> {
        let course = found_course(self.courses.find_course(account.course_id).await?)?;
        let user = found_user(self.users.find_user(account.user_id).await?)?;
        let enrolled = self.users.is_enrolled(user.id, course.id).await?;
        purchase(course, user, enrolled, amount)
    }

    /// Same checks as [`validate`](Self::validate), read through an open unit so
    /// they hold until it commits.
    pub async fn validate_in(
        &self,
        unit: &mut dyn UnitOfWork,
        account: &Account,
        amount: i64,
    ) -> Result<ValidatedPurchase, MerchantError> {
        let course = found_course(unit.find_course(account.course_id).await?)?;
        let user = found_user(unit.find_user(account.user_id).await?)?;
        let enrolled = unit.is_enrolled(user.id, course.id).await?;
        purchase(course, user, enrolled, amount)
    }
}

fn found_course(course: Option<Course>) -> Result<Course, MerchantError> {
    course.ok_or_else(|| MerchantError::invalid_account("courseId", "Course not found"))
}

fn found_user(user: Option<User>) -> Result<User, MerchantError> {
    user.ok_or_else(|| MerchantError::invalid_account("userId", "User not found"))
}

fn purchase(
    course: Course,
    user: User,
    enrolled: bool,
    amount: i64,
) -> Result<ValidatedPurchase, MerchantError> {
    if enrolled {
        return Err(MerchantError::invalid_account(
            "userId",
            "User already enrolled",
        ));
    }

    let price = expected_amount(&course)?;
    check_amount(price, amount)?;

    Ok(ValidatedPurchase {
        course,
        user,
        price,
    })
}

pub fn expected_amount(course: &Course) -> Result<i64, MerchantError> {
    course.price_minor_units().ok_or_else(|| {
        MerchantError::Internal(format!("price of course {} does not fit minor units", course.id))
    })
}

pub fn check_amount(expected: i64, received: i64) -> Result<(), MerchantError> {
    if received <= 0 || received != expected {
        return Err(MerchantError::InvalidAmount { expected, received });
    }
    Ok(())
}

pub fn receipt_detail(course: &Course, price: i64) -> ReceiptDetail {
    ReceiptDetail {
        items: vec![ReceiptItem {
            title: format!("Online course: {}", course.title),
            price,
            count: 1,
            code: EDUCATION_SERVICE_CODE.to_string(),
            package_code: EDUCATION_SERVICE_PACKAGE.to_string(),
            vat_percent: VAT_PERCENT,
        }],
    }
}
