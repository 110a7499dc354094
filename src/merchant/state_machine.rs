use std::sync::Arc;

use super::account::AccountValidator;
use super::error::MerchantError;
use super::side_effects::SideEffectCoordinator;
use crate::clock::Clock;
use crate::domain::{Account, LedgerEntry, NewLedgerEntry, TransactionState, Transition};
use crate::ports::{RepositoryError, TransactionLedger, UnitOfWork};

/// Drives ledger entries through create, perform and cancel.
///
/// Every transition runs inside one unit of work: the entry is read under lock,
/// the transition is decided, and the new state plus its side effect are
/// committed together. A replayed call finds the entry already in the target
/// state and returns it without touching anything.
#[derive(Clone)]
pub struct TransactionStateMachine {
    ledger: Arc<dyn TransactionLedger>,
    validator: AccountValidator,
    effects: SideEffectCoordinator,
    clock: Arc<dyn Clock>,
}

impl TransactionStateMachine {
    pub fn new(
        ledger: Arc<dyn TransactionLedger>,
        validator: AccountValidator,
        effects: SideEffectCoordinator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            validator,
            effects,
            clock,
        }
    }

    pub async fn create(
        &self,
        external_id: &str,
        gateway_time: i64,
        amount: i64,
        account: Account,
    ) -> Result<LedgerEntry, MerchantError> {
        let mut unit = self.ledger.begin().await?;
        if let Some(existing) = unit.lock(external_id).await? {
            return replay_create(existing, amount, gateway_time);
        }

        self.validator
            .validate_in(unit.as_mut(), &account, amount)
            .await?;

        let inserted = unit
            .insert(NewLedgerEntry {
                external_id: external_id.to_string(),
                gateway_time,
                amount,
                account,
                create_time: self.clock.now_millis(),
            })
            .await?;

        match inserted {
            Some(entry) => {
                unit.commit().await?;
                tracing::info!(external_id, user_id = account.user_id, course_id = account.course_id, "created transaction");
                Ok(entry)
            }
            None => {
                // Lost a race with a concurrent create for the same id.
                let existing = locked(unit.as_mut(), external_id).await?;
                replay_create(existing, amount, gateway_time)
            }
        }
    }

    pub async fn perform(&self, external_id: &str) -> Result<LedgerEntry, MerchantError> {
        let mut unit = self.ledger.begin().await?;
        let mut entry = locked(unit.as_mut(), external_id).await?;

        if entry.state == TransactionState::Initial
            && unit
                .is_enrolled(entry.account.user_id, entry.account.course_id)
                .await?
        {
            tracing::warn!(external_id, user_id = entry.account.user_id, "perform refused, user already enrolled");
            return Err(MerchantError::UnableToPerform(
                "User already enrolled".to_string(),
            ));
        }

        match entry.perform(self.clock.now_millis())? {
            Transition::Replayed => Ok(entry),
            Transition::Applied(effect) => {
                unit.save(&entry).await.map_err(|err| match err {
                    RepositoryError::Conflict(detail) => MerchantError::UnableToPerform(detail),
                    other => other.into(),
                })?;
                self.effects.apply(unit.as_mut(), effect, entry.account).await?;
                unit.commit().await?;
                tracing::info!(external_id, "performed transaction");
                Ok(entry)
            }
        }
    }

    pub async fn cancel(&self, external_id: &str, reason: i32) -> Result<LedgerEntry, MerchantError> {
        let mut unit = self.ledger.begin().await?;
        let mut entry = locked(unit.as_mut(), external_id).await?;

        match entry.cancel(reason, self.clock.now_millis())? {
            Transition::Replayed => Ok(entry),
            Transition::Applied(effect) => {
                unit.save(&entry).await?;
                self.effects.apply(unit.as_mut(), effect, entry.account).await?;
                unit.commit().await?;
                tracing::info!(external_id, reason, state = entry.state.name(), "cancelled transaction");
                Ok(entry)
            }
        }
    }

    pub async fn check(&self, external_id: &str) -> Result<LedgerEntry, MerchantError> {
        self.ledger
            .find(external_id)
            .await?
            .ok_or(MerchantError::TransactionNotFound)
    }
}

async fn locked(unit: &mut dyn UnitOfWork, external_id: &str) -> Result<LedgerEntry, MerchantError> {
    unit.lock(external_id)
        .await?
        .ok_or(MerchantError::TransactionNotFound)
}

fn replay_create(
    existing: LedgerEntry,
    amount: i64,
    gateway_time: i64,
) -> Result<LedgerEntry, MerchantError> {
    if existing.matches_creation(amount, gateway_time) {
        Ok(existing)
    } else {
        tracing::warn!(
            external_id = %existing.external_id,
            stored_amount = existing.amount,
            amount,
            "create replay does not match stored transaction"
        );
        Err(MerchantError::AmountOrGatewayTimeMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use crate::clock::ManualClock;
    use crate::domain::{Course, User};
    use bigdecimal::BigDecimal;

    struct Fixture {
        store: InMemoryStore,
        clock: Arc<ManualClock>,
        machine: TransactionStateMachine,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        store
            .add_course(Course {
                id: 7,
                title: "Async Rust".into(),
                price: BigDecimal::from(500),
                enrollment_count: 10,
            })
            .await;
        store
            .add_user(User {
                id: 3,
                email: "learner@example.com".into(),
                first_name: None,
            })
            .await;

        let shared = Arc::new(store.clone());
        let clock = Arc::new(ManualClock::new(5_000));
        let machine = TransactionStateMachine::new(
            shared.clone(),
            AccountValidator::new(shared.clone(), shared),
            SideEffectCoordinator::new(),
            clock.clone(),
        );
        Fixture {
            store,
            clock,
            machine,
        }
    }

    #[tokio::test]
    async fn create_replay_returns_stored_entry() {
        let f = fixture().await;
        let first = f.machine.create("tx1", 1000, 50_000, Account::new(7, 3)).await.unwrap();
        f.clock.advance(100);
        let again = f.machine.create("tx1", 1000, 50_000, Account::new(7, 3)).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(again.create_time, 5_000);
    }

    #[tokio::test]
    async fn create_replay_with_other_amount_is_mismatch() {
        let f = fixture().await;
        f.machine.create("tx1", 1000, 50_000, Account::new(7, 3)).await.unwrap();
        let err = f.machine.create("tx1", 1000, 40_000, Account::new(7, 3)).await.unwrap_err();
        assert!(matches!(err, MerchantError::AmountOrGatewayTimeMismatch));
        let err = f.machine.create("tx1", 1001, 50_000, Account::new(7, 3)).await.unwrap_err();
        assert_eq!(err.code(), -31001);
    }

    #[tokio::test]
    async fn create_revalidates_account() {
        let f = fixture().await;
        f.store.enroll_directly(3, 7).await;
        let err = f.machine.create("tx1", 1000, 50_000, Account::new(7, 3)).await.unwrap_err();
        assert_eq!(err.code(), -31008);
        assert!(f.store.find("tx1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn perform_enrolls_once() {
        let f = fixture().await;
        f.machine.create("tx1", 1000, 50_000, Account::new(7, 3)).await.unwrap();
        f.clock.set(6_000);
        let performed = f.machine.perform("tx1").await.unwrap();
        assert_eq!(performed.state, TransactionState::PayAccepted);
        assert_eq!(performed.perform_time, Some(6_000));
        assert_eq!(f.store.enrollment_count(7).await, Some(11));

        f.clock.set(7_000);
        let replay = f.machine.perform("tx1").await.unwrap();
        assert_eq!(replay.perform_time, Some(6_000));
        assert_eq!(f.store.enrollment_count(7).await, Some(11));
        assert_eq!(f.store.notifications().await.len(), 1);
    }

    #[tokio::test]
    async fn perform_for_already_enrolled_user_is_refused() {
        let f = fixture().await;
        f.machine.create("tx1", 1000, 50_000, Account::new(7, 3)).await.unwrap();
        f.machine.create("tx2", 1001, 50_000, Account::new(7, 3)).await.unwrap();
        f.machine.perform("tx1").await.unwrap();

        let err = f.machine.perform("tx2").await.unwrap_err();
        assert_eq!(err.code(), -31006);
        let tx2 = f.store.find("tx2").await.unwrap().unwrap();
        assert_eq!(tx2.state, TransactionState::Initial);
        assert_eq!(f.store.enrollment_count(7).await, Some(11));
    }

    #[tokio::test]
    async fn cancel_after_perform_unenrolls() {
        let f = fixture().await;
        f.machine.create("tx1", 1000, 50_000, Account::new(7, 3)).await.unwrap();
        f.machine.perform("tx1").await.unwrap();
        f.clock.set(9_000);

        let cancelled = f.machine.cancel("tx1", 1).await.unwrap();
        assert_eq!(cancelled.state, TransactionState::CancelledAfterSuccessful);
        assert_eq!(cancelled.cancel_time, Some(9_000));
        assert_eq!(f.store.enrollment_count(7).await, Some(10));

        let replay = f.machine.cancel("tx1", 1).await.unwrap();
        assert_eq!(replay.cancel_time, Some(9_000));
        assert_eq!(f.store.enrollment_count(7).await, Some(10));

        let err = f.machine.cancel("tx1", 2).await.unwrap_err();
        assert_eq!(err.code(), -31007);
        let err = f.machine.perform("tx1").await.unwrap_err();
        assert_eq!(err.code(), -31023);
    }

    #[tokio::test]
    async fn cancel_before_perform_leaves_enrollment_alone() {
        let f = fixture().await;
        f.machine.create("tx1", 1000, 50_000, Account::new(7, 3)).await.unwrap();
        let cancelled = f.machine.cancel("tx1", 3).await.unwrap();
        assert_eq!(cancelled.state, TransactionState::CancelledWhileWaiting);
        assert_eq!(f.store.enrollment_count(7).await, Some(10));
        assert!(f.store.notifications().await.is_empty());

        let err = f.machine.cancel("tx1", 5).await.unwrap_err();
        assert!(matches!(err, MerchantError::CancelConflict(Some(3))));
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let f = fixture().await;
        assert!(matches!(
            f.machine.perform("nope").await,
            Err(MerchantError::TransactionNotFound)
        ));
        assert!(matches!(
            f.machine.cancel("nope", 1).await,
            Err(MerchantError::TransactionNotFound)
        ));
        assert!(matches!(
            f.machine.check("nope").await,
            Err(MerchantError::TransactionNotFound)
        ));
    }

    #[tokio::test]
    async fn concurrent_performs_enroll_exactly_once() {
        let f = fixture().await;
        f.machine.create("tx1", 1000, 50_000, Account::new(7, 3)).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let machine = f.machine.clone();
                tokio::spawn(async move { machine.perform("tx1").await })
            })
            .collect();

        let mut perform_times = Vec::new();
        for handle in handles {
            perform_times.push(handle.await.unwrap().unwrap().perform_time);
        }
        perform_times.dedup();
        assert_eq!(perform_times.len(), 1);
        assert_eq!(f.store.enrollment_count(7).await, Some(11));
        assert_eq!(f.store.notifications().await.len(), 1);
    }

    struct TickingClock(std::sync::atomic::AtomicI64);

    impl Clock for TickingClock {
        fn now_millis(&self) -> i64 {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn create_racing_perform_never_admits_enrolled_user() {
        for _ in 0..25 {
            let f = fixture().await;
            let shared = Arc::new(f.store.clone());
            let machine = TransactionStateMachine::new(
                shared.clone(),
                AccountValidator::new(shared.clone(), shared),
                SideEffectCoordinator::new(),
                Arc::new(TickingClock(std::sync::atomic::AtomicI64::new(1))),
            );
            machine.create("tx1", 1000, 50_000, Account::new(7, 3)).await.unwrap();

            let performer = machine.clone();
            let creator = machine.clone();
            let perform = tokio::spawn(async move { performer.perform("tx1").await });
            let create = tokio::spawn(async move {
                creator.create("tx2", 2000, 50_000, Account::new(7, 3)).await
            });

            let performed = perform.await.unwrap().unwrap();
            match create.await.unwrap() {
                // Admitted only if it committed before the enrollment did.
                Ok(entry) => assert!(entry.create_time < performed.perform_time.unwrap()),
                Err(err) => {
                    assert_eq!(err.code(), -31008);
                    assert!(f.store.find("tx2").await.unwrap().is_none());
                }
            }
        }
    }
}
