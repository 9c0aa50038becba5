//! Group CRUD — a passthrough over the Identity Store (`spec.md` §6 line 160:
//! "Group CRUD ... are passthroughs to the stores").

use std::sync::Arc;

use axum::extract::Path;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::json;

use crate::response::ok;
use crate::response::ApiError;
use crate::state::AppState;

pub fn group_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/groups", get(list_groups).post(create_group))
        .route("/groups/:name/members", get(list_members).post(add_member))
        .with_state(state)
}

async fn list_groups(State(state): State<Arc<AppState>>) -> Response {
    let devices = match state.store.get_all_devices() {
        Ok(devices) => devices,
        Err(e) => return ApiError::from(e).into_response(),
    };
    // The Identity Store has no direct "list groups" query; every group a
    // device belongs to is discoverable by walking devices, which mirrors how
    // the Device Cache's own reverse index is built (`spec.md` §4.2).
    let mut names = std::collections::BTreeSet::new();
    for device in devices {
        names.extend(state.store.get_device_groups(device.id).unwrap_or_default());
    }
    ok(json!({ "groups": names.into_iter().collect::<Vec<_>>() }))
}

#[derive(Debug, Deserialize)]
struct CreateGroupRequest {
    name: String,
}

async fn create_group(State(state): State<Arc<AppState>>, Json(req): Json<CreateGroupRequest>) -> Response {
    match state.store.create_group(&req.name) {
        Ok(group) => ok(json!({ "id": group.id, "name": group.name })),
        Err(e) => ApiError::from(e).into_response(),
    }
}

async fn list_members(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match state.store.get_group_devices(&name) {
        Ok(devices) => ok(json!({ "members": devices })),
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct AddMemberRequest {
    uuid: String,
}

async fn add_member(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> Response {
    let device = match state.store.get_device_by_uuid(&req.uuid) {
        Ok(Some(device)) => device,
        Ok(None) => return ApiError::DEVICE_NOT_FOUND.into_response(),
        Err(e) => return ApiError::from(e).into_response(),
    };
    let group = match state.store.get_group_by_name(&name) {
        Ok(Some(group)) => group,
        Ok(None) => match state.store.create_group(&name) {
            Ok(group) => group,
            Err(e) => return ApiError::from(e).into_response(),
        },
        Err(e) => return ApiError::from(e).into_response(),
    };
    if let Err(e) = state.store.add_device_to_group(device.id, group.id) {
        return ApiError::from(e).into_response();
    }
    if let Some(client_id) = &device.client_id {
        let groups = state.store.get_device_groups(device.id).unwrap_or_default();
        state.cache.set_device_groups(client_id, &groups);
    }
    ok(serde_json::Value::Null)
}
