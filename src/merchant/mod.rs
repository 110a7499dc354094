//! Processor-facing merchant protocol.
//!
//! [`MerchantService::handle`] takes the raw call and always produces a protocol
//! envelope: admission through [`auth::AuthGate`], then parsing, then dispatch.

pub mod account;
pub mod auth;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod side_effects;
pub mod state_machine;
pub mod statement;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderMap;

use crate::clock::Clock;
use crate::config::MerchantConfig;
use crate::ports::{CourseCatalog, TransactionLedger, UserDirectory};

pub use account::AccountValidator;
pub use auth::AuthGate;
pub use dispatcher::MethodDispatcher;
pub use error::MerchantError;
pub use protocol::{RpcRequest, RpcResponse};
pub use side_effects::SideEffectCoordinator;
pub use state_machine::TransactionStateMachine;
pub use statement::StatementReader;

#[derive(Clone)]
pub struct MerchantService {
    gate: AuthGate,
    dispatcher: MethodDispatcher,
}

impl MerchantService {
    pub fn new(
        config: &MerchantConfig,
        courses: Arc<dyn CourseCatalog>,
        users: Arc<dyn UserDirectory>,
        ledger: Arc<dyn TransactionLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let validator = AccountValidator::new(courses, users);
        let machine = TransactionStateMachine::new(
            Arc::clone(&ledger),
            validator.clone(),
            SideEffectCoordinator::new(),
            clock,
        );
        let statements = StatementReader::new(ledger);

        Self {
            gate: AuthGate::new(config),
            dispatcher: MethodDispatcher::new(validator, machine, statements),
        }
    }

    pub async fn handle(
        &self,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        body: &[u8],
    ) -> RpcResponse {
        match self.gate.check(headers, peer) {
            Ok(key) => tracing::debug!(key = ?key, "merchant call admitted"),
            Err(err) => return RpcResponse::failure(protocol::peek_request_id(body), &err),
        }

        let request = match RpcRequest::parse(body) {
            Ok(request) => request,
            Err(err) => {
                tracing::info!(code = err.code(), error = %err, "unreadable merchant call");
                return RpcResponse::failure(protocol::peek_request_id(body), &err);
            }
        };

        let id = request.id;
        match self.dispatcher.dispatch(request).await {
            Ok(result) => RpcResponse::success(id, result),
            Err(err) => RpcResponse::failure(id, &err),
        }
    }
}
