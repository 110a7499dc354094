//! Protocol error taxonomy and its fixed numeric codes.

use thiserror::Error;

use crate::domain::{TransactionState, TransitionError};
use crate::ports::RepositoryError;

pub const CODE_PARSE_ERROR: i32 = -32700;
pub const CODE_INVALID_REQUEST: i32 = -32600;
pub const CODE_METHOD_NOT_FOUND: i32 = -32601;
pub const CODE_INTERNAL_ERROR: i32 = -32603;
pub const CODE_INSUFFICIENT_PRIVILEGE: i32 = -32504;
pub const CODE_INVALID_AMOUNT: i32 = -31001;
pub const CODE_TRANSACTION_NOT_FOUND: i32 = -31003;
pub const CODE_UNABLE_TO_PERFORM: i32 = -31006;
pub const CODE_NOT_CANCELLABLE: i32 = -31007;
pub const CODE_INVALID_ACCOUNT: i32 = -31008;
pub const CODE_NOT_PERFORMABLE: i32 = -31023;

#[derive(Debug, Error)]
pub enum MerchantError {
    #[error("Insufficient privilege")]
    AuthFailure,

    #[error("Parse error")]
    ParseError,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    UnknownMethod(String),

    #[error("Invalid account: {reason}")]
    InvalidAccount { field: &'static str, reason: String },

    #[error("Invalid amount. Expected: {expected}, Received: {received}")]
    InvalidAmount { expected: i64, received: i64 },

    #[error("Transaction parameters mismatch")]
    AmountOrGatewayTimeMismatch,

    #[error("Transaction not found")]
    TransactionNotFound,

    #[error("Unable to perform operation: {0}")]
    UnableToPerform(String),

    #[error("Transaction cannot be performed in state {}", .0.name())]
    NotPerformed(TransactionState),

    #[error("Transaction cannot be cancelled in state {}", .0.name())]
    NotCancelled(TransactionState),

    #[error("Transaction already cancelled with reason {0:?}")]
    CancelConflict(Option<i32>),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MerchantError {
    pub fn invalid_account(field: &'static str, reason: impl Into<String>) -> Self {
        MerchantError::InvalidAccount {
            field,
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            MerchantError::AuthFailure => CODE_INSUFFICIENT_PRIVILEGE,
            MerchantError::ParseError => CODE_PARSE_ERROR,
            MerchantError::InvalidRequest(_) => CODE_INVALID_REQUEST,
            MerchantError::UnknownMethod(_) => CODE_METHOD_NOT_FOUND,
            MerchantError::InvalidAccount { .. } => CODE_INVALID_ACCOUNT,
            MerchantError::InvalidAmount { .. } => CODE_INVALID_AMOUNT,
            MerchantError::AmountOrGatewayTimeMismatch => CODE_INVALID_AMOUNT,
            MerchantError::TransactionNotFound => CODE_TRANSACTION_NOT_FOUND,
            MerchantError::UnableToPerform(_) => CODE_UNABLE_TO_PERFORM,
            MerchantError::NotPerformed(_) => CODE_NOT_PERFORMABLE,
            MerchantError::NotCancelled(_) => CODE_NOT_CANCELLABLE,
            MerchantError::CancelConflict(_) => CODE_INVALID_ACCOUNT,
            MerchantError::Internal(_) => CODE_INTERNAL_ERROR,
        }
    }

    /// Message safe to hand to the caller. Internal detail never leaves the process.
    pub fn public_message(&self) -> String {
        match self {
            MerchantError::Internal(_) => "Internal error".to_string(),
            other => other.to_string(),
        }
    }

    /// Name of the offending request field, when there is one.
    pub fn data(&self) -> Option<String> {
        match self {
            MerchantError::InvalidAccount { field, .. } => Some((*field).to_string()),
            MerchantError::InvalidAmount { .. } | MerchantError::AmountOrGatewayTimeMismatch => {
                Some("amount".to_string())
            }
            _ => None,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, MerchantError::Internal(_))
    }
}

impl From<RepositoryError> for MerchantError {
    fn from(err: RepositoryError) -> Self {
        MerchantError::Internal(err.to_string())
    }
}

impl From<TransitionError> for MerchantError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::NotPerformable(state) => MerchantError::NotPerformed(state),
            TransitionError::NotCancellable(state) => MerchantError::NotCancelled(state),
            TransitionError::ReasonConflict {
                state: TransactionState::CancelledWhileWaiting,
                recorded,
            } => MerchantError::CancelConflict(recorded),
            TransitionError::ReasonConflict { state, .. } => MerchantError::NotCancelled(state),
        }
    }
}
