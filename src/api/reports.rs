// Report endpoints. The reporter is always the authenticated viewer.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;

use super::{body, respond_data, ApiResult};
use crate::app_state::AppState;
use crate::infrastructure::middleware::Vc;
use crate::services::ReportTarget;

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    #[serde(default)]
    pub reason: String,
}

async fn report(
    state: AppState,
    vc: Vc,
    target: ReportTarget,
    entity_id: &str,
    payload: Result<Json<ReportRequest>, JsonRejection>,
) -> ApiResult {
    let reporter = vc.require_user()?;
    let request = body(payload)?;
    let result = state
        .moderation
        .report(target, entity_id, reporter, &request.reason)
        .await?;
    respond_data(StatusCode::CREATED, "Report submitted", result)
}

pub async fn report_feed_handler(
    State(state): State<AppState>,
    vc: Vc,
    Path(id): Path<String>,
    payload: Result<Json<ReportRequest>, JsonRejection>,
) -> ApiResult {
    report(state, vc, ReportTarget::Feed, &id, payload).await
}

pub async fn report_business_handler(
    State(state): State<AppState>,
    vc: Vc,
    Path(id): Path<String>,
    payload: Result<Json<ReportRequest>, JsonRejection>,
) -> ApiResult {
    report(state, vc, ReportTarget::Business, &id, payload).await
}

pub async fn report_deal_handler(
    State(state): State<AppState>,
    vc: Vc,
    Path(id): Path<String>,
    payload: Result<Json<ReportRequest>, JsonRejection>,
) -> ApiResult {
    report(state, vc, ReportTarget::Wholesale, &id, payload).await
}

pub async fn report_daily_service_handler(
    State(state): State<AppState>,
    vc: Vc,
    Path(id): Path<String>,
    payload: Result<Json<ReportRequest>, JsonRejection>,
) -> ApiResult {
    report(state, vc, ReportTarget::DailyService, &id, payload).await
}

pub async fn report_user_handler(
    State(state): State<AppState>,
    vc: Vc,
    Path(id): Path<String>,
    payload: Result<Json<ReportRequest>, JsonRejection>,
) -> ApiResult {
    report(state, vc, ReportTarget::User, &id, payload).await
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/feed/report/{id}", post(report_feed_handler))
        .route("/business/report/{id}", post(report_business_handler))
        .route("/wholesale/report/{id}", post(report_deal_handler))
        .route("/daily-service/report/{id}", post(report_daily_service_handler))
        .route("/users/report/{id}", post(report_user_handler))
}
