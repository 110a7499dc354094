use std::time::Instant;

use super::account::AccountValidator;
use super::error::MerchantError;
use super::protocol::{
    parse_params, CancelParams, CheckPerformParams, CheckPerformResult, CreateParams, Method,
    MethodResult, RpcRequest, StatementParams, StatementResult, TransactionIdParams,
    TransactionResult,
};
use super::state_machine::TransactionStateMachine;
use super::statement::StatementReader;

/// Routes a parsed request to its operation and shapes the result.
#[derive(Clone)]
pub struct MethodDispatcher {
    validator: AccountValidator,
    machine: TransactionStateMachine,
    statements: StatementReader,
}

impl MethodDispatcher {
    pub fn new(
        validator: AccountValidator,
        machine: TransactionStateMachine,
        statements: StatementReader,
    ) -> Self {
        Self {
            validator,
            machine,
            statements,
        }
    }

    pub async fn dispatch(&self, request: RpcRequest) -> Result<MethodResult, MerchantError> {
        let method: Method = request.method.parse()?;
        let started = Instant::now();

        let outcome = self.invoke(method, request.params).await;

        match &outcome {
            Ok(_) => tracing::info!(
                method = method.as_str(),
                rpc_id = ?request.id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "merchant call handled"
            ),
            Err(err) if err.is_internal() => tracing::error!(
                method = method.as_str(),
                rpc_id = ?request.id,
                error = %err,
                "merchant call failed"
            ),
            Err(err) => tracing::info!(
                method = method.as_str(),
                rpc_id = ?request.id,
                code = err.code(),
                error = %err,
                "merchant call rejected"
            ),
        }

        outcome
    }

    async fn invoke(
        &self,
        method: Method,
        params: serde_json::Value,
    ) -> Result<MethodResult, MerchantError> {
        match method {
            Method::CheckPerformTransaction => {
                let params: CheckPerformParams = parse_params(params)?;
                let account = params.account.resolve()?;
                let purchase = self.validator.validate(&account, params.amount).await?;
                Ok(MethodResult::CheckPerform(CheckPerformResult {
                    allow: true,
                    detail: purchase.detail(),
                }))
            }
            Method::CreateTransaction => {
                let params: CreateParams = parse_params(params)?;
                let account = params.account.resolve()?;
                let entry = self
                    .machine
                    .create(&params.id, params.time, params.amount, account)
                    .await?;
                Ok(MethodResult::Transaction(TransactionResult::created(&entry)))
            }
            Method::PerformTransaction => {
                let params: TransactionIdParams = parse_params(params)?;
                let entry = self.machine.perform(&params.id).await?;
                Ok(MethodResult::Transaction(TransactionResult::performed(&entry)))
            }
            Method::CancelTransaction => {
                let params: CancelParams = parse_params(params)?;
                let entry = self.machine.cancel(&params.id, params.reason).await?;
                Ok(MethodResult::Transaction(TransactionResult::cancelled(&entry)))
            }
            Method::CheckTransaction => {
                let params: TransactionIdParams = parse_params(params)?;
                let entry = self.machine.check(&params.id).await?;
                Ok(MethodResult::Transaction(TransactionResult::snapshot(&entry)))
            }
            Method::GetStatement => {
                let params: StatementParams = parse_params(params)?;
                let transactions = self.statements.read(params.from, params.to).await?;
                Ok(MethodResult::Statement(StatementResult { transactions }))
            }
        }
    }
}
