use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use bigdecimal::BigDecimal;
use serde_json::{json, Value};
use tower::ServiceExt;

use coursepay_core::adapters::InMemoryStore;
use coursepay_core::clock::ManualClock;
use coursepay_core::config::Config;
use coursepay_core::domain::{Course, User};
use coursepay_core::{create_app, AppState};

const ADMIN_KEY: &str = "admin-key";

async fn setup() -> Router {
    let store = InMemoryStore::new();
    store
        .add_course(Course {
            id: 7,
            title: "Async Rust in Production".into(),
            price: BigDecimal::from_str("500.00").unwrap(),
            enrollment_count: 0,
        })
        .await;
    store
        .add_user(User {
            id: 3,
            email: "learner@example.com".into(),
            first_name: None,
        })
        .await;

    let vars: HashMap<&str, &str> = [
        ("DATABASE_URL", "postgres://unused@localhost/unused"),
        ("ADMIN_API_KEY", ADMIN_KEY),
        ("MERCHANT_ID", "merchant-1"),
        ("MERCHANT_KEY", "live-secret"),
        ("MERCHANT_TEST_KEY", "test-secret"),
        ("MERCHANT_RETURN_URL", "https://courses.example.com/payment/return"),
    ]
    .into_iter()
    .collect();
    let config = Config::from_vars(|key| vars.get(key).map(|v| v.to_string())).unwrap();

    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let state = AppState::new(&config, Arc::new(store), clock);
    create_app(state, &config)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn admin_get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(AUTHORIZATION, format!("Bearer {ADMIN_KEY}"))
        .body(Body::empty())
        .unwrap()
}

/// Creates and performs one purchase through the processor endpoint.
async fn buy(app: &Router, external_id: &str) {
    let auth = format!(
        "Basic {}",
        general_purpose::STANDARD.encode("Paycom:live-secret")
    );
    for (method, params) in [
        (
            "CreateTransaction",
            json!({
                "id": external_id,
                "time": 1000,
                "amount": 50_000,
                "account": { "courseId": 7, "userId": 3 }
            }),
        ),
        ("PerformTransaction", json!({ "id": external_id })),
    ] {
        let request = Request::builder()
            .method("POST")
            .uri("/api/payme/endpoint")
            .header(AUTHORIZATION, auth.clone())
            .body(Body::from(
                json!({ "method": method, "params": params, "id": 1 }).to_string(),
            ))
            .unwrap();
        let (_, body) = send(app, request).await;
        assert!(body.get("result").is_some(), "{method} failed: {body}");
    }
}

#[tokio::test]
async fn health_reports_ledger() {
    let app = setup().await;
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["dependencies"]["ledger"]["status"], "healthy");
}

#[tokio::test]
async fn payment_url_points_to_checkout() {
    let app = setup().await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/payme/payment-url")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "courseId": 7, "userId": 3 }).to_string()))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    let url = body["paymentUrl"].as_str().unwrap();
    assert!(url.starts_with("https://checkout.paycom.uz/?m=merchant-1"));
    assert!(url.contains("a=50000"));
}

#[tokio::test]
async fn payment_url_for_missing_course_is_404() {
    let app = setup().await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/payme/payment-url")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "courseId": 70, "userId": 3 }).to_string()))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn stats_require_admin_key() {
    let app = setup().await;
    buy(&app, "tx1").await;

    let (status, _) = send(&app, get("/api/payme/stats")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, admin_get("/api/payme/stats?period=month")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalTransactions"], 1);
    assert_eq!(body["successfulPayments"], 1);
    assert_eq!(body["cancelledPayments"], 0);
    assert_eq!(body["period"], "month");
    assert_eq!(
        BigDecimal::from_str(body["totalRevenue"].as_str().unwrap()).unwrap(),
        BigDecimal::from(500)
    );

    let (status, _) = send(&app, admin_get("/api/payme/stats?period=fortnight")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn user_history_and_status() {
    let app = setup().await;
    buy(&app, "tx1").await;

    let (status, body) = send(&app, get("/api/payme/my-transactions?userId=3")).await;
    assert_eq!(status, StatusCode::OK);
    let history = body.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["transactionId"], "tx1");
    assert_eq!(history[0]["state"], "PAY_ACCEPTED");
    assert_eq!(history[0]["courseTitle"], "Async Rust in Production");

    let (status, body) = send(&app, get("/api/payme/transaction/tx1/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["statusMessage"], "Payment completed successfully");

    let (status, _) = send(&app, get("/api/payme/transaction/nope/status")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_listing_is_enriched_and_paged() {
    let app = setup().await;
    buy(&app, "tx1").await;

    let (status, _) = send(&app, get("/api/payme/admin/transactions")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        admin_get("/api/payme/admin/transactions?status=PAY_ACCEPTED&page=0&size=10"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["size"], 10);
    let rows = body["transactions"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["userEmail"], "learner@example.com");
    assert_eq!(rows[0]["courseTitle"], "Async Rust in Production");

    let (_, body) = send(
        &app,
        admin_get("/api/payme/admin/transactions?status=INITIAL"),
    )
    .await;
    assert!(body["transactions"].as_array().unwrap().is_empty());
}
