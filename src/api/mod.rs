// HTTP surface. Handlers parse ids and bodies, call one service, and wrap the result in the
// `{success, code, ...}` envelope.

pub mod businesses;
pub mod daily_services;
pub mod feeds;
pub mod orders;
pub mod reports;
pub mod requests;
pub mod societies;
pub mod users;
pub mod wholesale;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        State,
    },
    http::StatusCode,
    middleware,
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::infrastructure::id_generator::DocId;
use crate::infrastructure::middleware::viewer_context_middleware;

pub type ApiResult = Result<(StatusCode, Json<Value>), AppError>;

/// Every route under `/api`, behind the viewer context middleware, plus `/health`.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(orders::routes())
        .merge(feeds::routes())
        .merge(businesses::routes())
        .merge(wholesale::routes())
        .merge(daily_services::routes())
        .merge(users::routes())
        .merge(societies::routes())
        .merge(reports::routes())
        .merge(requests::routes());

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            viewer_context_middleware::<AppState>,
        ))
        .with_state(state)
}

pub async fn health_handler(State(state): State<AppState>) -> ApiResult {
    state.store.database().health_check().await?;
    respond(StatusCode::OK, json!({ "status": "ok" }))
}

/// Flatten `body` into the success envelope. Non-object bodies go under `data`.
pub fn respond<T: Serialize>(status: StatusCode, body: T) -> ApiResult {
    let mut body = match serde_json::to_value(body)? {
        Value::Object(map) => Value::Object(map),
        other => json!({ "data": other }),
    };
    body["success"] = json!(true);
    body["code"] = json!(status.as_u16());
    Ok((status, Json(body)))
}

pub fn respond_data<T: Serialize>(status: StatusCode, message: &str, data: T) -> ApiResult {
    respond(status, json!({ "message": message, "data": data }))
}

pub fn parse_id(raw: &str, label: &str) -> AppResult<DocId> {
    DocId::parse(raw).map_err(|_| AppError::BadRequest(format!("Invalid {} ID", label)))
}

pub fn body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload.map(|Json(body)| body).map_err(AppError::from)
}

pub fn query<T>(params: Result<axum::extract::Query<T>, QueryRejection>) -> AppResult<T> {
    params
        .map(|axum::extract::Query(params)| params)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}
