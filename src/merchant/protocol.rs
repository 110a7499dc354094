//! Wire shapes of the processor's merchant protocol.
//!
//! Requests arrive as `{method, params, id}`; replies carry either `result` or
//! `error` plus the same `id`.

use std::fmt;
use std::str::FromStr;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use super::error::MerchantError;
use crate::domain::{Account, LedgerEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    CheckPerformTransaction,
    CreateTransaction,
    PerformTransaction,
    CancelTransaction,
    CheckTransaction,
    GetStatement,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::CheckPerformTransaction => "CheckPerformTransaction",
            Method::CreateTransaction => "CreateTransaction",
            Method::PerformTransaction => "PerformTransaction",
            Method::CancelTransaction => "CancelTransaction",
            Method::CheckTransaction => "CheckTransaction",
            Method::GetStatement => "GetStatement",
        }
    }
}

impl FromStr for Method {
    type Err = MerchantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CheckPerformTransaction" => Ok(Method::CheckPerformTransaction),
            "CreateTransaction" => Ok(Method::CreateTransaction),
            "PerformTransaction" => Ok(Method::PerformTransaction),
            "CancelTransaction" => Ok(Method::CancelTransaction),
            "CheckTransaction" => Ok(Method::CheckTransaction),
            "GetStatement" => Ok(Method::GetStatement),
            other => Err(MerchantError::UnknownMethod(other.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    pub id: Option<i64>,
}

impl RpcRequest {
    /// Parse a raw body. Malformed JSON is a parse error; a JSON value that is
    /// not a request object is an invalid request.
    pub fn parse(body: &[u8]) -> Result<Self, MerchantError> {
        let value: Value = serde_json::from_slice(body).map_err(|_| MerchantError::ParseError)?;
        serde_json::from_value(value)
            .map_err(|e| MerchantError::InvalidRequest(format!("malformed request: {e}")))
    }
}

/// Best-effort read of the request id, for replies to requests that were not parsed.
pub fn peek_request_id(body: &[u8]) -> Option<i64> {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|value| value.get("id").and_then(Value::as_i64))
}

pub fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, MerchantError> {
    serde_json::from_value(params)
        .map_err(|e| MerchantError::InvalidRequest(format!("invalid params: {e}")))
}

/// Account as sent by the processor. Values may be numbers or numeric strings
/// and either naming convention.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountParams {
    #[serde(default, rename = "courseId", alias = "course_id")]
    pub course_id: Option<Value>,
    #[serde(default, rename = "userId", alias = "user_id")]
    pub user_id: Option<Value>,
}

impl AccountParams {
    pub fn resolve(&self) -> Result<Account, MerchantError> {
        let course_id = account_id(self.course_id.as_ref(), "courseId")?;
        let user_id = account_id(self.user_id.as_ref(), "userId")?;
        Ok(Account::new(course_id, user_id))
    }
}

fn account_id(value: Option<&Value>, field: &'static str) -> Result<i64, MerchantError> {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed
        .filter(|id| *id > 0)
        .ok_or_else(|| MerchantError::invalid_account(field, "Invalid account parameters"))
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckPerformParams {
    pub amount: i64,
    #[serde(default)]
    pub account: AccountParams,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateParams {
    pub id: String,
    pub time: i64,
    pub amount: i64,
    #[serde(default)]
    pub account: AccountParams,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionIdParams {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelParams {
    pub id: String,
    pub reason: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatementParams {
    pub from: i64,
    pub to: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptItem {
    pub title: String,
    /// Unit price, minor units.
    pub price: i64,
    pub count: u32,
    pub code: String,
    pub package_code: String,
    pub vat_percent: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptDetail {
    pub items: Vec<ReceiptItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckPerformResult {
    pub allow: bool,
    pub detail: ReceiptDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionResult {
    pub transaction: String,
    pub create_time: i64,
    pub state: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perform_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<i32>,
}

impl TransactionResult {
    fn base(entry: &LedgerEntry) -> Self {
        Self {
            transaction: entry.external_id.clone(),
            create_time: entry.create_time,
            state: entry.state.code(),
            perform_time: None,
            cancel_time: None,
            reason: None,
        }
    }

    pub fn created(entry: &LedgerEntry) -> Self {
        Self::base(entry)
    }

    pub fn performed(entry: &LedgerEntry) -> Self {
        Self {
            perform_time: entry.perform_time,
            ..Self::base(entry)
        }
    }

    pub fn cancelled(entry: &LedgerEntry) -> Self {
        Self {
            cancel_time: entry.cancel_time,
            ..Self::base(entry)
        }
    }

    pub fn snapshot(entry: &LedgerEntry) -> Self {
        Self {
            perform_time: entry.perform_time,
            cancel_time: entry.cancel_time,
            reason: entry.reason,
            ..Self::base(entry)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementEntry {
    pub id: String,
    pub time: i64,
    pub amount: i64,
    pub account: Account,
    pub create_time: i64,
    pub perform_time: Option<i64>,
    pub cancel_time: Option<i64>,
    pub transaction: String,
    pub state: i32,
    pub reason: Option<i32>,
}

impl From<&LedgerEntry> for StatementEntry {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            id: entry.external_id.clone(),
            time: entry.gateway_time,
            amount: entry.amount,
            account: entry.account,
            create_time: entry.create_time,
            perform_time: entry.perform_time,
            cancel_time: entry.cancel_time,
            transaction: entry.external_id.clone(),
            state: entry.state.code(),
            reason: entry.reason,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatementResult {
    pub transactions: Vec<StatementEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MethodResult {
    CheckPerform(CheckPerformResult),
    Transaction(TransactionResult),
    Statement(StatementResult),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl From<&MerchantError> for RpcError {
    fn from(err: &MerchantError) -> Self {
        Self {
            code: err.code(),
            message: err.public_message(),
            data: err.data(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<MethodResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Option<i64>,
}

impl RpcResponse {
    pub fn success(id: Option<i64>, result: MethodResult) -> Self {
        Self {
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Option<i64>, err: &MerchantError) -> Self {
        Self {
            result: None,
            error: Some(RpcError::from(err)),
            id,
        }
    }
}
