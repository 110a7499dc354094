use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::ports::TransactionLedger;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: HashMap<String, DependencyStatus>,
}

impl HealthResponse {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyStatus {
    Healthy { status: String, latency_ms: u64 },
    Unhealthy { status: String, error: String },
}

#[async_trait]
pub trait DependencyChecker: Send + Sync {
    async fn check(&self) -> DependencyStatus;
}

/// Round-trips the ledger store.
pub struct LedgerChecker {
    ledger: Arc<dyn TransactionLedger>,
}

impl LedgerChecker {
    pub fn new(ledger: Arc<dyn TransactionLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl DependencyChecker for LedgerChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match self.ledger.ping().await {
            Ok(()) => DependencyStatus::Healthy {
                status: "healthy".to_string(),
                latency_ms: start.elapsed().as_millis() as u64,
            },
            Err(e) => {
                tracing::error!(error = %e, "ledger health check failed");
                DependencyStatus::Unhealthy {
                    status: "unhealthy".to_string(),
                    error: "unreachable".to_string(),
                }
            }
        }
    }
}

pub async fn check_health(ledger: &LedgerChecker, start_time: Instant) -> HealthResponse {
    let timeout_duration = Duration::from_secs(5);

    let ledger_result = timeout(timeout_duration, ledger.check()).await;

    let mut dependencies = HashMap::new();
    dependencies.insert(
        "ledger".to_string(),
        ledger_result.unwrap_or_else(|_| DependencyStatus::Unhealthy {
            status: "unhealthy".to_string(),
            error: "timeout".to_string(),
        }),
    );

    HealthResponse {
        status: determine_overall_status(&dependencies),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: start_time.elapsed().as_secs(),
        dependencies,
    }
}

fn determine_overall_status(dependencies: &HashMap<String, DependencyStatus>) -> String {
    let failed = dependencies
        .values()
        .any(|status| matches!(status, DependencyStatus::Unhealthy { .. }));

    if failed {
        "unhealthy".to_string()
    } else {
        "healthy".to_string()
    }
}
