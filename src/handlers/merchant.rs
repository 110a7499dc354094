use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::HeaderMap,
    Json,
};

use crate::merchant::RpcResponse;
use crate::AppState;

/// Single processor endpoint. Always answers 200 with a protocol envelope;
/// the processor reads any other status as a transport failure.
pub async fn merchant_endpoint(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<RpcResponse> {
    let peer = connect_info.map(|ConnectInfo(addr)| addr);
    Json(state.merchant.handle(&headers, peer, &body).await)
}
