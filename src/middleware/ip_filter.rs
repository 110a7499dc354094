//! Caller address resolution for the merchant endpoint.

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use axum::http::HeaderMap;

use crate::config::AllowedIps;

pub fn is_allowed(client_ip: Option<IpAddr>, allowed_ips: &AllowedIps) -> bool {
    match allowed_ips {
        AllowedIps::Any => true,
        AllowedIps::Cidrs(cidrs) => client_ip
            .map(|ip| cidrs.iter().any(|cidr| cidr.contains(&ip)))
            .unwrap_or(false),
    }
}

/// Resolve the caller address. `X-Forwarded-For` wins when the configured
/// number of trusted proxies leaves a client entry in the chain; otherwise the
/// socket peer is used.
pub fn client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trusted_proxy_depth: usize,
) -> Option<IpAddr> {
    if trusted_proxy_depth > 0 {
        if let Some(ip) = extract_from_x_forwarded_for(headers, trusted_proxy_depth) {
            return Some(ip);
        }
    }

    peer.map(|addr| addr.ip())
}

fn extract_from_x_forwarded_for(headers: &HeaderMap, trusted_proxy_depth: usize) -> Option<IpAddr> {
    let raw = headers.get("x-forwarded-for")?.to_str().ok()?;

    let chain: Vec<IpAddr> = raw
        .split(',')
        .map(str::trim)
        .filter_map(parse_ip_from_xff_entry)
        .collect();

    if chain.is_empty() || trusted_proxy_depth >= chain.len() {
        return None;
    }

    let index = chain.len().saturating_sub(1 + trusted_proxy_depth);
    chain.get(index).copied()
}

fn parse_ip_from_xff_entry(value: &str) -> Option<IpAddr> {
    if let Ok(ip) = IpAddr::from_str(value) {
        return Some(ip);
    }

    if let Ok(addr) = SocketAddr::from_str(value) {
        return Some(addr.ip());
    }

    None
}
