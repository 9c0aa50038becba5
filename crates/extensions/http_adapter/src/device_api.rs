//! Device-facing HTTP compatibility surface (`spec.md` §6, lines 156-159):
//! `/device/auth` (bootstrap + credential minting), `/device/s` (publish) and
//! `/device/r` (HTTP-mode inbox).

use std::sync::Arc;

use axum::extract::Query;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::Json;
use axum::Router;
use broker_engine::PublishOutcome;
use broker_engine::SessionIdentity;
use broker_engine::SessionKind;
use identity_store::DeviceMode;
use serde::Deserialize;
use serde_json::json;
use serde_json::Value;
use tracing::warn;

use crate::response::ok;
use crate::response::ApiError;
use crate::state::AppState;
use crate::util::now_ms;
use crate::util::random_token;

pub fn device_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/device/auth", post(bootstrap_device).get(mint_credentials))
        .route("/device/s", post(publish))
        .route("/device/r", get(receive))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct BootstrapRequest {
    uuid: String,
}

/// `POST /device/auth {uuid}`: idempotent; create-device/create-group/join on
/// first call, always returns the device's `authKey`.
async fn bootstrap_device(State(state): State<Arc<AppState>>, Json(req): Json<BootstrapRequest>) -> Response {
    let device = match state.store.get_device_by_uuid(&req.uuid) {
        Ok(Some(device)) => device,
        Ok(None) => match state.store.create_device(&req.uuid, &random_token(32)) {
            Ok(device) => {
                provision_self_group(&state, &req.uuid, device.id);
                device
            }
            Err(e) => return ApiError::from(e).into_response(),
        },
        Err(e) => return ApiError::from(e).into_response(),
    };
    ok(json!({ "authKey": device.auth_key }))
}

fn provision_self_group(state: &AppState, uuid: &str, device_id: i64) {
    let group = match state.store.create_group(uuid) {
        Ok(group) => group,
        Err(identity_store::StoreError::AlreadyExists { .. }) => {
            match state.store.get_group_by_name(uuid) {
                Ok(Some(group)) => group,
                _ => return,
            }
        }
        Err(e) => {
            warn!(uuid, error = %e, "failed to create device's self-group");
            return;
        }
    };
    if let Err(e) = state.store.add_device_to_group(device_id, group.id) {
        warn!(uuid, error = %e, "failed to join device to its self-group");
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsQuery {
    auth_key: String,
    mode: String,
}

/// `GET /device/auth?authKey&mode=mqtt|http`: mints fresh MQTT credentials and
/// seeds the Device Cache.
async fn mint_credentials(State(state): State<Arc<AppState>>, Query(q): Query<CredentialsQuery>) -> Response {
    let Some(mode) = DeviceMode::parse(&q.mode) else {
        return ApiError::BAD_REQUEST.into_response();
    };
    let device = match state.store.get_device_by_auth_key(&q.auth_key) {
        Ok(Some(device)) => device,
        Ok(None) => return ApiError::DEVICE_NOT_FOUND.into_response(),
        Err(e) => return ApiError::from(e).into_response(),
    };

    let client_id = format!("cid_{}", random_token(16));
    let username = format!("user_{}", &device.uuid[..device.uuid.len().min(8)]);
    let password = random_token(24);
    if let Err(e) = state
        .store
        .update_device_connection(&q.auth_key, &client_id, &username, &password)
    {
        return ApiError::from(e).into_response();
    }

    let mut refreshed = device.clone();
    refreshed.client_id = Some(client_id.clone());
    refreshed.username = Some(username.clone());
    refreshed.password = Some(password.clone());
    state.cache.set_device_by_auth_key(&q.auth_key, refreshed.clone());
    state.cache.set_device_by_client_id(&client_id, refreshed);
    state.cache.set_device_mode(&client_id, mode);
    let groups = state.store.get_device_groups(device.id).unwrap_or_default();
    state.cache.set_device_groups(&client_id, &groups);

    if mode == DeviceMode::Http {
        if let Err(e) = state.store.update_device_online_status(device.id, true, DeviceMode::Http) {
            warn!(device_id = device.id, error = %e, "failed to record http online status");
        }
        state.cache.set_http_device_last_active(&client_id, now_ms());
    }

    ok(json!({ "clientId": client_id, "username": username, "password": password }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishRequest {
    auth_key: String,
    #[serde(flatten)]
    body: Value,
}

/// `POST /device/s {authKey, toDevice|toGroup, data}`: steps 1-5 of the
/// publish pipeline on behalf of the authenticated device.
async fn publish(State(state): State<Arc<AppState>>, Json(req): Json<PublishRequest>) -> Response {
    let device = match resolve_device(&state, &req.auth_key) {
        Some(device) => device,
        None => return ApiError::DEVICE_NOT_FOUND.into_response(),
    };
    let Some(client_id) = device.client_id.clone() else {
        return ApiError::NOT_ONLINE.into_response();
    };
    let Ok(payload) = serde_json::to_vec(&req.body) else {
        return ApiError::BAD_REQUEST.into_response();
    };

    let session = SessionIdentity {
        client_id: client_id.clone(),
        kind: SessionKind::Device {
            device_id: device.id,
            uuid: device.uuid.clone(),
        },
    };
    let now = now_ms();
    let is_http_sender = state.cache.is_http_mode(&client_id);
    let outcome = state.engine.handle_http_publish(&session, &client_id, &payload, now);

    if is_http_sender {
        state.cache.set_http_device_last_active(&client_id, now);
        if let Err(e) = state.store.update_device_online_status(device.id, true, DeviceMode::Http) {
            warn!(device_id = device.id, error = %e, "failed to refresh http last-active status");
        }
    }

    match outcome {
        PublishOutcome::Accepted => ok_empty_response(),
        PublishOutcome::Dropped => ApiError::BAD_REQUEST.into_response(),
        PublishOutcome::ViolationClose => {
            if payload.len() > state.max_message_bytes {
                ApiError::MESSAGE_TOO_LARGE.into_response()
            } else {
                ApiError::RATE_LIMITED.into_response()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboxQuery {
    auth_key: String,
}

/// `GET /device/r?authKey`: HTTP-mode-only; returns and clears the pending
/// queue.
async fn receive(State(state): State<Arc<AppState>>, Query(q): Query<InboxQuery>) -> Response {
    let device = match resolve_device(&state, &q.auth_key) {
        Some(device) => device,
        None => return ApiError::DEVICE_NOT_FOUND.into_response(),
    };
    let Some(client_id) = device.client_id.clone() else {
        return ApiError::NOT_ONLINE.into_response();
    };
    if !state.cache.is_http_mode(&client_id) {
        return ApiError::NOT_ONLINE.into_response();
    }

    let now = now_ms();
    state.cache.set_http_device_last_active(&client_id, now);
    let messages = state.cache.get_pending_messages(&client_id, now);
    ok(json!({ "messages": messages, "count": messages.len() }))
}

fn resolve_device(state: &AppState, auth_key: &str) -> Option<identity_store::Device> {
    state
        .cache
        .get_device_by_auth_key(auth_key)
        .or_else(|| state.store.get_device_by_auth_key(auth_key).ok().flatten())
}

fn ok_empty_response() -> Response {
    ok(Value::Null)
}
