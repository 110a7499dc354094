use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::services::AdminQuery;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentUrlRequest {
    pub course_id: i64,
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub period: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct AdminListQuery {
    pub status: Option<String>,
    pub period: Option<String>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

pub async fn payment_url(
    State(state): State<AppState>,
    Json(request): Json<PaymentUrlRequest>,
) -> Result<impl IntoResponse, AppError> {
    let url = state
        .reporting
        .payment_url(request.course_id, request.user_id)
        .await?;

    Ok(Json(json!({
        "paymentUrl": url,
        "status": "success",
    })))
}

pub async fn stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let stats = state.reporting.stats(query.period.as_deref()).await?;
    Ok(Json(stats))
}

pub async fn my_transactions(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<impl IntoResponse, AppError> {
    let transactions = state.reporting.user_transactions(query.user_id).await?;
    Ok(Json(transactions))
}

pub async fn transaction_status(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let status = state.reporting.transaction_status(&external_id).await?;
    Ok(Json(status))
}

pub async fn admin_transactions(
    State(state): State<AppState>,
    Query(query): Query<AdminListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = state
        .reporting
        .admin_transactions(&AdminQuery {
            status: query.status,
            period: query.period,
            page: query.page,
            size: query.size,
        })
        .await?;
    Ok(Json(page))
}
