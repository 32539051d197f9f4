use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};

use super::{body, parse_id, respond, respond_data, ApiResult};
use crate::app_state::AppState;
use crate::models::daily_service::NewDailyService;
use crate::services::{ReviewInput, ReviewTarget};

pub async fn create_daily_service_handler(
    State(state): State<AppState>,
    payload: Result<Json<NewDailyService>, JsonRejection>,
) -> ApiResult {
    let (service, created) = state.daily_services.create(body(payload)?).await?;
    if created {
        respond_data(StatusCode::CREATED, "Daily service created", service)
    } else {
        respond_data(StatusCode::OK, "Daily service already registered, details merged", service)
    }
}

pub async fn list_daily_services_handler(State(state): State<AppState>) -> ApiResult {
    respond(StatusCode::OK, state.daily_services.list().await?)
}

pub async fn review_daily_service_handler(
    State(state): State<AppState>,
    Path(service_id): Path<String>,
    payload: Result<Json<ReviewInput>, JsonRejection>,
) -> ApiResult {
    let service_id = parse_id(&service_id, "daily service")?;
    let result = state
        .engagement
        .add_review(ReviewTarget::DailyService, &service_id, body(payload)?)
        .await?;
    respond_data(StatusCode::CREATED, "Review added", result)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/daily-service/create", post(create_daily_service_handler))
        .route("/daily-service/all", get(list_daily_services_handler))
        .route("/daily-service/{service_id}/review", post(review_daily_service_handler))
}
