pub mod merchant;
pub mod payments;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::health::check_health;
use crate::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let report = check_health(&state.health, state.started_at).await;

    // 503 when the ledger is unreachable, 200 otherwise
    let status_code = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(report))
}
