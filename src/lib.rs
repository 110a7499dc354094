pub mod adapters;
pub mod cli;
pub mod clock;
pub mod config;
pub mod cors;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod merchant;
pub mod middleware;
pub mod ports;
pub mod services;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};

use crate::clock::Clock;
use crate::config::Config;
use crate::health::LedgerChecker;
use crate::merchant::MerchantService;
use crate::middleware::auth::{admin_auth, AdminKey};
use crate::middleware::request_logger::request_logger_middleware;
use crate::ports::{CourseCatalog, TransactionLedger, UserDirectory};
use crate::services::ReportingService;

#[derive(Clone)]
pub struct AppState {
    pub merchant: MerchantService,
    pub reporting: ReportingService,
    pub health: Arc<LedgerChecker>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire every component over one store that serves all three ports.
    pub fn new<S>(config: &Config, store: Arc<S>, clock: Arc<dyn Clock>) -> Self
    where
        S: CourseCatalog + UserDirectory + TransactionLedger + 'static,
    {
        let courses: Arc<dyn CourseCatalog> = store.clone();
        let users: Arc<dyn UserDirectory> = store.clone();
        let ledger: Arc<dyn TransactionLedger> = store;

        Self {
            merchant: MerchantService::new(
                &config.merchant,
                Arc::clone(&courses),
                Arc::clone(&users),
                Arc::clone(&ledger),
                Arc::clone(&clock),
            ),
            reporting: ReportingService::new(
                &config.merchant,
                courses,
                users,
                Arc::clone(&ledger),
                clock,
            ),
            health: Arc::new(LedgerChecker::new(ledger)),
            started_at: Instant::now(),
        }
    }
}

pub fn create_app(state: AppState, config: &Config) -> Router {
    let admin_routes = Router::new()
        .route("/api/payme/stats", get(handlers::payments::stats))
        .route(
            "/api/payme/admin/transactions",
            get(handlers::payments::admin_transactions),
        )
        .route_layer(from_fn_with_state(
            AdminKey::new(config.admin_api_key.as_str()),
            admin_auth,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/payme/endpoint",
            post(handlers::merchant::merchant_endpoint),
        )
        .route("/api/payme/payment-url", post(handlers::payments::payment_url))
        .route(
            "/api/payme/my-transactions",
            get(handlers::payments::my_transactions),
        )
        .route(
            "/api/payme/transaction/:id/status",
            get(handlers::payments::transaction_status),
        )
        .merge(admin_routes)
        .layer(cors::create_cors_layer(config.cors_allowed_origins.as_deref()))
        .layer(from_fn(request_logger_middleware))
        .with_state(state)
}
