//! Peer-broker (Bridge) CRUD and device-share management
//! (`spec.md` §4.7, §6 line 160).

use std::sync::Arc;

use axum::extract::Path;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::delete;
use axum::routing::get;
use axum::routing::post;
use axum::Json;
use axum::Router;
use identity_store::SharePermission;
use serde::Deserialize;
use serde_json::json;
use serde_json::Value;

use crate::response::ok;
use crate::response::ApiError;
use crate::state::AppState;

pub fn peer_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/peers", get(list_peers).post(add_peer))
        .route("/peers/:broker_id", delete(remove_peer).put(update_peer))
        .route("/peers/:broker_id/shares", post(share_device))
        .route("/peers/:broker_id/shares/:uuid", delete(unshare_device))
        .with_state(state)
}

async fn list_peers(State(state): State<Arc<AppState>>) -> Response {
    match state.store.get_all_remotes() {
        // The bridge token is a credential, not a display field; never echo
        // it back over the management API.
        Ok(remotes) => ok(json!({
            "peers": remotes
                .into_iter()
                .map(|r| json!({
                    "brokerId": r.broker_id,
                    "url": r.url,
                    "enabled": r.enabled,
                }))
                .collect::<Vec<_>>(),
        })),
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct PeerRequest {
    broker_id: String,
    url: String,
    token: String,
}

async fn add_peer(State(state): State<Arc<AppState>>, Json(req): Json<PeerRequest>) -> Response {
    let Some(bridge) = &state.bridge else {
        return ApiError::BAD_REQUEST.into_response();
    };
    match bridge.add_remote(&req.broker_id, &req.url, &req.token) {
        Ok(()) => ok(Value::Null),
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct UpdatePeerRequest {
    url: String,
    token: String,
}

async fn update_peer(
    State(state): State<Arc<AppState>>,
    Path(broker_id): Path<String>,
    Json(req): Json<UpdatePeerRequest>,
) -> Response {
    let Some(bridge) = &state.bridge else {
        return ApiError::BAD_REQUEST.into_response();
    };
    match bridge.update_remote(&broker_id, &req.url, &req.token) {
        Ok(()) => ok(Value::Null),
        Err(e) => ApiError::from(e).into_response(),
    }
}

async fn remove_peer(State(state): State<Arc<AppState>>, Path(broker_id): Path<String>) -> Response {
    let Some(bridge) = &state.bridge else {
        return ApiError::BAD_REQUEST.into_response();
    };
    match bridge.remove_remote(&broker_id) {
        Ok(()) => ok(Value::Null),
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct ShareRequest {
    uuid: String,
    permission: String,
}

async fn share_device(
    State(state): State<Arc<AppState>>,
    Path(broker_id): Path<String>,
    Json(req): Json<ShareRequest>,
) -> Response {
    let Some(permission) = SharePermission::parse(&req.permission) else {
        return ApiError::BAD_REQUEST.into_response();
    };
    let device = match state.store.get_device_by_uuid(&req.uuid) {
        Ok(Some(device)) => device,
        Ok(None) => return ApiError::DEVICE_NOT_FOUND.into_response(),
        Err(e) => return ApiError::from(e).into_response(),
    };
    if let Err(e) = state.store.share_device(&broker_id, device.id, permission) {
        return ApiError::from(e).into_response();
    }
    if let Some(bridge) = &state.bridge {
        bridge.push_share_sync(&broker_id);
    }
    ok(Value::Null)
}

async fn unshare_device(
    State(state): State<Arc<AppState>>,
    Path((broker_id, uuid)): Path<(String, String)>,
) -> Response {
    let device = match state.store.get_device_by_uuid(&uuid) {
        Ok(Some(device)) => device,
        Ok(None) => return ApiError::DEVICE_NOT_FOUND.into_response(),
        Err(e) => return ApiError::from(e).into_response(),
    };
    if let Err(e) = state.store.unshare_device(&broker_id, device.id) {
        return ApiError::from(e).into_response();
    }
    if let Some(bridge) = &state.bridge {
        bridge.push_share_sync(&broker_id);
    }
    ok(Value::Null)
}
