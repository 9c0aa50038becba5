//! Bearer-token guard for the management surface (`spec.md` §6, Environment:
//! `USER_TOKEN`; §9 Error handling: "bearer mismatch -> 1008; local-loopback
//! requests bypass the check").

use std::net::IpAddr;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ConnectInfo;
use axum::extract::Request;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;

use crate::response::ApiError;
use crate::state::AppState;

pub async fn require_management_token(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = &state.user_token else {
        return next.run(req).await;
    };
    if is_loopback(addr) {
        return next.run(req).await;
    }

    let provided = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if provided != Some(expected.as_str()) {
        return ApiError::UNAUTHORIZED.into_response();
    }
    next.run(req).await
}

fn is_loopback(addr: SocketAddr) -> bool {
    match addr.ip() {
        IpAddr::V4(ip) => ip.is_loopback(),
        IpAddr::V6(ip) => ip.is_loopback(),
    }
}
