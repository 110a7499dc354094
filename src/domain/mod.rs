pub mod course;
pub mod transaction;

pub use course::{
    to_major_units, to_minor_units, Course, Notification, NotificationKind, User, MINOR_UNITS,
};
pub use transaction::{
    Account, Effect, LedgerEntry, NewLedgerEntry, TransactionState, Transition, TransitionError,
};
