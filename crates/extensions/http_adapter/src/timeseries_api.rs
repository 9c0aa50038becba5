//! Timeseries query — a passthrough over `queryTimeseriesData`
//! (`spec.md` §6 line 160, §9).

use std::sync::Arc;

use axum::extract::Query;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::response::ok;
use crate::response::ApiError;
use crate::state::AppState;

pub fn timeseries_router(state: Arc<AppState>) -> Router {
    Router::new().route("/timeseries", get(query)).with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeseriesQuery {
    device_uuid: String,
    data_key: String,
    from: i64,
    to: i64,
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_page_size")]
    page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    100
}

async fn query(State(state): State<Arc<AppState>>, Query(q): Query<TimeseriesQuery>) -> Response {
    match state
        .store
        .query_timeseries_data(&q.device_uuid, &q.data_key, q.from, q.to, q.page, q.page_size)
    {
        Ok(page) => ok(page),
        Err(e) => ApiError::from(e).into_response(),
    }
}
