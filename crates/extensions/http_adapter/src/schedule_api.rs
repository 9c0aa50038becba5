//! Scheduler CRUD over the HTTP management surface (`spec.md` §4.8, §6 line
//! 160: "scheduler CRUD are passthroughs ... to the scheduler").

use std::sync::Arc;

use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::delete;
use axum::routing::get;
use axum::routing::post;
use axum::Json;
use axum::Router;
use scheduler::CreateTaskParams;
use scheduler::TaskMode;
use scheduler::UpdateTaskFields;
use serde::Deserialize;
use serde_json::json;
use serde_json::Value;

use crate::response::ok;
use crate::response::ApiError;
use crate::state::AppState;
use crate::util::now_ms;

pub fn schedule_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/schedule", post(create_task).get(list_tasks))
        .route("/schedule/:id", get(get_task).put(update_task).delete(delete_task))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskRequest {
    auth_key: String,
    target_client_id: String,
    command: Value,
    mode: String,
    execute_at: Option<i64>,
    countdown: Option<i64>,
    interval: Option<i64>,
}

fn parse_create_params(req: &CreateTaskRequest) -> Result<CreateTaskParams, ApiError> {
    match req.mode.as_str() {
        "scheduled" => {
            let execute_at = req.execute_at.ok_or(ApiError::BAD_REQUEST)?;
            Ok(CreateTaskParams::Scheduled { execute_at })
        }
        "countdown" => {
            let countdown_secs = req.countdown.ok_or(ApiError::BAD_REQUEST)?;
            Ok(CreateTaskParams::Countdown { countdown_secs })
        }
        "recurring" => {
            let interval_secs = req.interval.ok_or(ApiError::BAD_REQUEST)?;
            Ok(CreateTaskParams::Recurring {
                interval_secs,
                execute_at: req.execute_at,
            })
        }
        _ => Err(ApiError::BAD_REQUEST),
    }
}

async fn create_task(State(state): State<Arc<AppState>>, Json(req): Json<CreateTaskRequest>) -> Response {
    let params = match parse_create_params(&req) {
        Ok(params) => params,
        Err(e) => return e.into_response(),
    };
    match state
        .scheduler
        .create_task(&req.auth_key, &req.target_client_id, req.command, params, now_ms())
    {
        Ok(task) => ok(task_json(&task)),
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTasksQuery {
    auth_key: String,
}

async fn list_tasks(State(state): State<Arc<AppState>>, Query(q): Query<ListTasksQuery>) -> Response {
    let tasks: Vec<_> = state
        .scheduler
        .list_tasks_for_auth_key(&q.auth_key)
        .iter()
        .map(task_json)
        .collect();
    ok(json!({ "tasks": tasks }))
}

async fn get_task(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.scheduler.get_task(&id) {
        Ok(task) => ok(task_json(&task)),
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTaskRequest {
    target_client_id: Option<String>,
    command: Option<Value>,
    mode: Option<String>,
    execute_at: Option<i64>,
    countdown: Option<i64>,
    interval: Option<i64>,
    enabled: Option<bool>,
}

async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTaskRequest>,
) -> Response {
    let new_mode = match req.mode.as_deref().map(parse_mode) {
        Some(Some(mode)) => Some(mode),
        Some(None) => return ApiError::BAD_REQUEST.into_response(),
        None => None,
    };
    let fields = UpdateTaskFields {
        target_client_id: req.target_client_id,
        command: req.command,
        new_mode,
        execute_at: req.execute_at,
        countdown_secs: req.countdown,
        interval_secs: req.interval,
        enabled: req.enabled,
    };
    match state.scheduler.update_task(&id, fields, now_ms()) {
        Ok(task) => ok(task_json(&task)),
        Err(e) => ApiError::from(e).into_response(),
    }
}

fn parse_mode(s: &str) -> Option<TaskMode> {
    TaskMode::parse(s)
}

async fn delete_task(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.scheduler.delete_task(&id) {
        Ok(()) => ok(Value::Null),
        Err(e) => ApiError::from(e).into_response(),
    }
}

fn task_json(task: &scheduler::ScheduledTask) -> Value {
    json!({
        "id": task.id,
        "targetClientId": task.target_client_id,
        "command": task.command,
        "mode": task.mode.as_str(),
        "executeAt": task.execute_at,
        "intervalMs": task.interval_ms,
        "createdAt": task.created_at,
        "lastExecutedAt": task.last_executed_at,
        "enabled": task.enabled,
    })
}
