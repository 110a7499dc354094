use std::net::SocketAddr;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use base64::{engine::general_purpose, Engine as _};

use super::error::MerchantError;
use crate::config::{AllowedIps, MerchantConfig};
use crate::middleware::auth::secrets_match;
use crate::middleware::ip_filter::{client_ip, is_allowed};

/// Which configured secret the caller presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Live,
    Test,
}

/// Admission check for processor calls. Runs before any ledger access.
#[derive(Debug, Clone)]
pub struct AuthGate {
    login: String,
    live_key: String,
    test_key: String,
    allowed_ips: AllowedIps,
    trusted_proxy_depth: usize,
}

impl AuthGate {
    pub fn new(config: &MerchantConfig) -> Self {
        Self {
            login: config.login.clone(),
            live_key: config.live_key.clone(),
            test_key: config.test_key.clone(),
            allowed_ips: config.allowed_ips.clone(),
            trusted_proxy_depth: config.trusted_proxy_depth,
        }
    }

    /// Address allowlist first, then HTTP Basic credentials.
    pub fn check(
        &self,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
    ) -> Result<KeyKind, MerchantError> {
        let ip = client_ip(headers, peer, self.trusted_proxy_depth);
        if !is_allowed(ip, &self.allowed_ips) {
            tracing::warn!(client_ip = ?ip, "rejected merchant call from address outside allowlist");
            return Err(MerchantError::AuthFailure);
        }

        let Some((login, password)) = basic_credentials(headers) else {
            tracing::warn!(client_ip = ?ip, "merchant call without usable basic credentials");
            return Err(MerchantError::AuthFailure);
        };

        if !secrets_match(&login, &self.login) {
            tracing::warn!(client_ip = ?ip, "merchant call with unknown login");
            return Err(MerchantError::AuthFailure);
        }

        // Both keys are always compared.
        let live = secrets_match(&password, &self.live_key);
        let test = secrets_match(&password, &self.test_key);
        match (live, test) {
            (true, _) => Ok(KeyKind::Live),
            (false, true) => Ok(KeyKind::Test),
            (false, false) => {
                tracing::warn!(client_ip = ?ip, "merchant call with invalid key");
                Err(MerchantError::AuthFailure)
            }
        }
    }
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (login, password) = decoded.split_once(':')?;
    Some((login.to_string(), password.to_string()))
}
