use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use serde::Serialize;
use serde_json::Value;

/// The response envelope and code dictionary of `spec.md` §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiError(pub u32);

impl ApiError {
    pub const BAD_REQUEST: ApiError = ApiError(1001);
    pub const SERVER_ERROR: ApiError = ApiError(1002);
    pub const DEVICE_NOT_FOUND: ApiError = ApiError(1003);
    pub const MESSAGE_TOO_LARGE: ApiError = ApiError(1004);
    pub const RATE_LIMITED: ApiError = ApiError(1005);
    pub const FORBIDDEN_GROUP: ApiError = ApiError(1006);
    pub const NOT_ONLINE: ApiError = ApiError(1007);
    pub const UNAUTHORIZED: ApiError = ApiError(1008);

    fn status(&self) -> StatusCode {
        match self.0 {
            1001 => StatusCode::BAD_REQUEST,
            1003 => StatusCode::NOT_FOUND,
            1004 => StatusCode::PAYLOAD_TOO_LARGE,
            1005 => StatusCode::TOO_MANY_REQUESTS,
            1006 => StatusCode::FORBIDDEN,
            1007 => StatusCode::CONFLICT,
            1008 => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct Envelope {
    message: u32,
    detail: Value,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(Envelope {
                message: self.0,
                detail: Value::Null,
            }),
        )
            .into_response()
    }
}

/// `{"message": 1000, "detail": ...}` (`spec.md` §6).
pub fn ok<T: Serialize>(detail: T) -> Response {
    let detail = serde_json::to_value(detail).unwrap_or(Value::Null);
    Json(Envelope { message: 1000, detail }).into_response()
}

pub fn ok_empty() -> Response {
    ok(Value::Null)
}

/// Unique-constraint violations surface as bad-request; everything else is an
/// internal DB error (`spec.md` §9, Error handling).
impl From<identity_store::StoreError> for ApiError {
    fn from(e: identity_store::StoreError) -> Self {
        use identity_store::StoreError as E;
        match e {
            E::AlreadyExists { .. } => ApiError::BAD_REQUEST,
            E::DeviceNotFound | E::GroupNotFound | E::PeerNotFound { .. } => ApiError::DEVICE_NOT_FOUND,
            E::Database(_) | E::Open { .. } => ApiError::SERVER_ERROR,
        }
    }
}

/// `spec.md` §6 dictionary reuses 1008 for "task not found"; everything else
/// scheduler rejects at create/update time is a bad request.
impl From<scheduler::SchedulerError> for ApiError {
    fn from(e: scheduler::SchedulerError) -> Self {
        match e {
            scheduler::SchedulerError::TaskNotFound(_) => ApiError::UNAUTHORIZED,
            scheduler::SchedulerError::MissingParameter { .. }
            | scheduler::SchedulerError::InvalidParameter { .. } => ApiError::BAD_REQUEST,
        }
    }
}
