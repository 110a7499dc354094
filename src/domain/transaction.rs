//! Merchant transaction domain entity.
//! Framework-agnostic representation of one processor transaction and its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Purchase target carried by every processor call: which user buys which course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "courseId")]
    pub course_id: i64,
    #[serde(rename = "userId")]
    pub user_id: i64,
}

impl Account {
    pub fn new(course_id: i64, user_id: i64) -> Self {
        Self { course_id, user_id }
    }
}

/// Lifecycle state of a ledger entry.
///
/// The integer codes are part of the wire contract and of the stored schema,
/// so they are mapped explicitly rather than derived from declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionState {
    Initial,
    /// Reserved by the processor numbering. Never assigned by this service.
    WaitingPay,
    PayAccepted,
    CancelledWhileWaiting,
    CancelledAfterSuccessful,
}

impl TransactionState {
    pub const ALL: [TransactionState; 5] = [
        TransactionState::Initial,
        TransactionState::WaitingPay,
        TransactionState::PayAccepted,
        TransactionState::CancelledWhileWaiting,
        TransactionState::CancelledAfterSuccessful,
    ];

    pub fn code(self) -> i32 {
        match self {
            TransactionState::Initial => 1,
            TransactionState::WaitingPay => 2,
            TransactionState::PayAccepted => 3,
            TransactionState::CancelledWhileWaiting => 4,
            TransactionState::CancelledAfterSuccessful => 5,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(TransactionState::Initial),
            2 => Some(TransactionState::WaitingPay),
            3 => Some(TransactionState::PayAccepted),
            4 => Some(TransactionState::CancelledWhileWaiting),
            5 => Some(TransactionState::CancelledAfterSuccessful),
            _ => None,
        }
    }

    /// Upper snake case name used by the admin listing filter and views.
    pub fn name(self) -> &'static str {
        match self {
            TransactionState::Initial => "INITIAL",
            TransactionState::WaitingPay => "WAITING_PAY",
            TransactionState::PayAccepted => "PAY_ACCEPTED",
            TransactionState::CancelledWhileWaiting => "CANCELLED_WHILE_WAITING",
            TransactionState::CancelledAfterSuccessful => "CANCELLED_AFTER_SUCCESSFUL",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|state| state.name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn is_cancelled(self) -> bool {
        matches!(
            self,
            TransactionState::CancelledWhileWaiting | TransactionState::CancelledAfterSuccessful
        )
    }
}

/// Side effect owed by a transition that was applied for the first time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    Enroll,
    Unenroll,
}

/// Result of asking an entry to move to a new state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The entry changed; the caller owes the side effect.
    Applied(Effect),
    /// The entry already was in the requested state; nothing changed.
    Replayed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("transaction in state {0:?} cannot be performed")]
    NotPerformable(TransactionState),

    #[error("transaction in state {0:?} cannot be cancelled")]
    NotCancellable(TransactionState),

    #[error("transaction already cancelled in state {state:?} with reason {recorded:?}")]
    ReasonConflict {
        state: TransactionState,
        recorded: Option<i32>,
    },
}

/// Fields required to append a new entry to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub external_id: String,
    pub gateway_time: i64,
    pub amount: i64,
    pub account: Account,
    pub create_time: i64,
}

/// One ledger record. Amount is in minor units; all times are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: i64,
    pub external_id: String,
    pub gateway_time: i64,
    pub amount: i64,
    pub account: Account,
    pub state: TransactionState,
    pub create_time: i64,
    pub perform_time: Option<i64>,
    pub cancel_time: Option<i64>,
    pub reason: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn from_new(id: i64, new: NewLedgerEntry) -> Self {
        let now = Utc::now();
        Self {
            id,
            external_id: new.external_id,
            gateway_time: new.gateway_time,
            amount: new.amount,
            account: new.account,
            state: TransactionState::Initial,
            create_time: new.create_time,
            perform_time: None,
            cancel_time: None,
            reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A replayed create must carry the same amount and processor time.
    pub fn matches_creation(&self, amount: i64, gateway_time: i64) -> bool {
        self.amount == amount && self.gateway_time == gateway_time
    }

    pub fn perform(&mut self, now: i64) -> Result<Transition, TransitionError> {
        match self.state {
            TransactionState::Initial => {
                self.state = TransactionState::PayAccepted;
                self.perform_time = Some(now);
                self.updated_at = Utc::now();
                Ok(Transition::Applied(Effect::Enroll))
            }
            TransactionState::PayAccepted => Ok(Transition::Replayed),
            other => Err(TransitionError::NotPerformable(other)),
        }
    }

    pub fn cancel(&mut self, reason: i32, now: i64) -> Result<Transition, TransitionError> {
        let effect = match self.state {
            TransactionState::Initial => {
                self.state = TransactionState::CancelledWhileWaiting;
                Effect::None
            }
            TransactionState::PayAccepted => {
                self.state = TransactionState::CancelledAfterSuccessful;
                Effect::Unenroll
            }
            state if state.is_cancelled() => {
                if self.reason == Some(reason) {
                    return Ok(Transition::Replayed);
                }
                return Err(TransitionError::ReasonConflict {
                    state,
                    recorded: self.reason,
                });
            }
            other => return Err(TransitionError::NotCancellable(other)),
        };

        self.cancel_time = Some(now);
        self.reason = Some(reason);
        self.updated_at = Utc::now();
        Ok(Transition::Applied(effect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> LedgerEntry {
        LedgerEntry::from_new(
            1,
            NewLedgerEntry {
                external_id: "tx1".to_string(),
                gateway_time: 1000,
                amount: 50_000,
                account: Account::new(7, 3),
                create_time: 2000,
            },
        )
    }

    #[test]
    fn state_codes_are_fixed() {
        let codes: Vec<i32> = TransactionState::ALL.iter().map(|s| s.code()).collect();
        assert_eq!(codes, vec![1, 2, 3, 4, 5]);
        for state in TransactionState::ALL {
            assert_eq!(TransactionState::from_code(state.code()), Some(state));
            assert_eq!(TransactionState::from_name(state.name()), Some(state));
        }
        assert_eq!(TransactionState::from_code(0), None);
        assert_eq!(TransactionState::from_code(-1), None);
        assert_eq!(TransactionState::from_name("pay_accepted"), Some(TransactionState::PayAccepted));
        assert_eq!(TransactionState::from_name("bogus"), None);
    }

    #[test]
    fn perform_from_initial_owes_enrollment() {
        let mut tx = entry();
        assert_eq!(tx.perform(3000), Ok(Transition::Applied(Effect::Enroll)));
        assert_eq!(tx.state, TransactionState::PayAccepted);
        assert_eq!(tx.perform_time, Some(3000));
    }

    #[test]
    fn perform_replay_keeps_original_time() {
        let mut tx = entry();
        tx.perform(3000).unwrap();
        assert_eq!(tx.perform(9000), Ok(Transition::Replayed));
        assert_eq!(tx.perform_time, Some(3000));
    }

    #[test]
    fn perform_after_cancel_is_rejected() {
        let mut tx = entry();
        tx.cancel(3, 3000).unwrap();
        assert_eq!(
            tx.perform(4000),
            Err(TransitionError::NotPerformable(TransactionState::CancelledWhileWaiting))
        );
        assert_eq!(tx.perform_time, None);
    }

    #[test]
    fn cancel_while_waiting_has_no_effect() {
        let mut tx = entry();
        assert_eq!(tx.cancel(3, 3000), Ok(Transition::Applied(Effect::None)));
        assert_eq!(tx.state, TransactionState::CancelledWhileWaiting);
        assert_eq!(tx.cancel_time, Some(3000));
        assert_eq!(tx.reason, Some(3));
    }

    #[test]
    fn cancel_after_success_owes_unenrollment() {
        let mut tx = entry();
        tx.perform(3000).unwrap();
        assert_eq!(tx.cancel(1, 4000), Ok(Transition::Applied(Effect::Unenroll)));
        assert_eq!(tx.state, TransactionState::CancelledAfterSuccessful);
        assert_eq!(tx.perform_time, Some(3000));
        assert_eq!(tx.cancel_time, Some(4000));
    }

    #[test]
    fn cancel_replay_with_same_reason_is_idempotent() {
        let mut tx = entry();
        tx.perform(3000).unwrap();
        tx.cancel(1, 4000).unwrap();
        assert_eq!(tx.cancel(1, 5000), Ok(Transition::Replayed));
        assert_eq!(tx.cancel_time, Some(4000));
    }

    #[test]
    fn cancel_replay_with_other_reason_conflicts() {
        let mut tx = entry();
        tx.cancel(3, 3000).unwrap();
        assert_eq!(
            tx.cancel(5, 4000),
            Err(TransitionError::ReasonConflict {
                state: TransactionState::CancelledWhileWaiting,
                recorded: Some(3),
            })
        );
        assert_eq!(tx.reason, Some(3));
    }

    #[test]
    fn reserved_waiting_state_is_neither_performable_nor_cancellable() {
        let mut tx = entry();
        tx.state = TransactionState::WaitingPay;
        assert!(matches!(tx.perform(1), Err(TransitionError::NotPerformable(_))));
        assert!(matches!(tx.cancel(1, 1), Err(TransitionError::NotCancellable(_))));
    }

    #[test]
    fn creation_match_compares_amount_and_time() {
        let tx = entry();
        assert!(tx.matches_creation(50_000, 1000));
        assert!(!tx.matches_creation(50_001, 1000));
        assert!(!tx.matches_creation(50_000, 1001));
    }
}
