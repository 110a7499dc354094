use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};

use crate::error::AppError;

/// Shared secret guarding the admin reporting routes.
#[derive(Clone)]
pub struct AdminKey(Arc<str>);

impl AdminKey {
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    fn accepts(&self, header: &str) -> bool {
        let presented = header.strip_prefix("Bearer ").unwrap_or(header).trim();
        !presented.is_empty() && secrets_match(presented, &self.0)
    }
}

/// Compares two shared secrets in time independent of where they first differ.
pub fn secrets_match(presented: &str, expected: &str) -> bool {
    constant_time_eq::constant_time_eq(presented.as_bytes(), expected.as_bytes())
}

pub async fn admin_auth(
    State(key): State<AdminKey>,
    req: Request<Body>,
    next: Next<Body>,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    match auth_header {
        Some(auth) if key.accepts(auth) => Ok(next.run(req).await),
        _ => {
            tracing::warn!(uri = %req.uri(), "rejected admin request");
            Err(AppError::Unauthorized("invalid or missing admin key".to_string()))
        }
    }
}
