use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde_json::{json, Value};

use super::{body, parse_id, respond, respond_data, ApiResult};
use crate::app_state::AppState;
use crate::error::AppError;
use crate::models::common::VerificationStatus;
use crate::models::request::{NewUserRequest, RequestStatusUpdate};

pub async fn create_request_handler(
    State(state): State<AppState>,
    payload: Result<Json<NewUserRequest>, JsonRejection>,
) -> ApiResult {
    let request = state.requests.create(body(payload)?).await?;
    respond_data(StatusCode::CREATED, "Request created", request)
}

pub async fn requests_by_status_handler(
    State(state): State<AppState>,
    Path(status): Path<String>,
) -> ApiResult {
    let status: VerificationStatus = serde_json::from_value(Value::String(status))
        .map_err(|_| AppError::BadRequest("Invalid request status".to_string()))?;
    let requests = state.requests.list_by_status(status).await?;
    respond(StatusCode::OK, json!({ "count": requests.len(), "data": requests }))
}

pub async fn update_request_status_handler(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    payload: Result<Json<RequestStatusUpdate>, JsonRejection>,
) -> ApiResult {
    let request_id = parse_id(&request_id, "request")?;
    let update = body(payload)?;
    let request = state.requests.update_status(&request_id, update.status).await?;
    respond_data(StatusCode::OK, "Request updated", request)
}

pub async fn user_requests_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult {
    let requests = state.requests.list_by_user(&parse_id(&user_id, "user")?).await?;
    respond(StatusCode::OK, json!({ "count": requests.len(), "data": requests }))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/request", post(create_request_handler))
        .route("/request/status/{status}", get(requests_by_status_handler))
        .route("/request/{request_id}", put(update_request_status_handler))
        .route("/users/{user_id}/requests", get(user_requests_handler))
}
