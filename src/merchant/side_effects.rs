//! Enrollment changes and notifications owed by ledger transitions.
//!
//! Only ever called with the unit of work that also carries the ledger write,
//! so a failure here rolls the transition back with it.

use crate::domain::{Account, Course, Effect, Notification, NotificationKind};
use crate::ports::{RepositoryError, RepositoryResult, UnitOfWork};

#[derive(Debug, Clone, Copy, Default)]
pub struct SideEffectCoordinator;

impl SideEffectCoordinator {
    pub fn new() -> Self {
        Self
    }

    pub async fn apply(
        &self,
        unit: &mut dyn UnitOfWork,
        effect: Effect,
        account: Account,
    ) -> RepositoryResult<()> {
        match effect {
            Effect::None => Ok(()),
            Effect::Enroll => {
                let course = Self::course(unit, account.course_id).await?;
                unit.enroll(account.user_id, account.course_id).await?;
                unit.queue_notification(&payment_accepted(account.user_id, &course))
                    .await?;
                tracing::info!(
                    user_id = account.user_id,
                    course_id = account.course_id,
                    "enrolled user after accepted payment"
                );
                Ok(())
            }
            Effect::Unenroll => {
                let course = Self::course(unit, account.course_id).await?;
                unit.unenroll(account.user_id, account.course_id).await?;
                unit.queue_notification(&payment_cancelled(account.user_id, &course))
                    .await?;
                tracing::info!(
                    user_id = account.user_id,
                    course_id = account.course_id,
                    "revoked enrollment after cancelled payment"
                );
                Ok(())
            }
        }
    }

    async fn course(unit: &mut dyn UnitOfWork, course_id: i64) -> RepositoryResult<Course> {
        unit.find_course(course_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("course {course_id}")))
    }
}

fn payment_accepted(user_id: i64, course: &Course) -> Notification {
    Notification {
        user_id,
        kind: NotificationKind::Success,
        title: "Payment successful".to_string(),
        message: format!(
            "Your payment for \"{}\" was accepted. You now have full access to the course.",
            course.title
        ),
        link: Some(format!("/courses/{}", course.id)),
    }
}

fn payment_cancelled(user_id: i64, course: &Course) -> Notification {
    Notification {
        user_id,
        kind: NotificationKind::Warning,
        title: "Payment cancelled".to_string(),
        message: format!(
            "Your payment for \"{}\" was cancelled. Access to the course has been removed.",
            course.title
        ),
        link: Some("/dashboard/purchases".to_string()),
    }
}
