use std::sync::Arc;

use super::error::MerchantError;
use super::protocol::StatementEntry;
use crate::ports::TransactionLedger;

/// Read-only range scan over the ledger by local creation time.
#[derive(Clone)]
pub struct StatementReader {
    ledger: Arc<dyn TransactionLedger>,
}

impl StatementReader {
    pub fn new(ledger: Arc<dyn TransactionLedger>) -> Self {
        Self { ledger }
    }

    /// Entries with `from <= create_time <= to`, oldest first. An inverted
    /// range matches nothing.
    pub async fn read(&self, from: i64, to: i64) -> Result<Vec<StatementEntry>, MerchantError> {
        if from > to {
            tracing::debug!(from, to, "inverted statement range");
            return Ok(Vec::new());
        }

        let entries = self.ledger.statement(from, to).await?;
        tracing::debug!(from, to, count = entries.len(), "statement read");
        Ok(entries.iter().map(StatementEntry::from).collect())
    }
}
