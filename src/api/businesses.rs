use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;

use super::{body, parse_id, respond, respond_data, ApiResult};
use crate::app_state::AppState;
use crate::models::business::{BusinessPatchRequest, NewBusiness};
use crate::services::{ReviewInput, ReviewTarget};

pub async fn create_business_handler(
    State(state): State<AppState>,
    payload: Result<Json<NewBusiness>, JsonRejection>,
) -> ApiResult {
    let business = state.businesses.create(body(payload)?).await?;
    respond_data(StatusCode::CREATED, "Business created", business)
}

pub async fn get_business_handler(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
) -> ApiResult {
    let business = state.businesses.get(&parse_id(&business_id, "business")?).await?;
    respond(StatusCode::OK, json!({ "data": business }))
}

pub async fn patch_business_handler(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
    payload: Result<Json<BusinessPatchRequest>, JsonRejection>,
) -> ApiResult {
    let business_id = parse_id(&business_id, "business")?;
    let business = state.businesses.patch(&business_id, body(payload)?).await?;
    respond_data(StatusCode::OK, "Business updated", business)
}

pub async fn delete_business_handler(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
) -> ApiResult {
    let business_id = parse_id(&business_id, "business")?;
    state.businesses.delete(&business_id).await?;
    respond(StatusCode::OK, json!({ "message": "Business deleted", "id": business_id }))
}

pub async fn list_businesses_handler(State(state): State<AppState>) -> ApiResult {
    let businesses = state.businesses.list_all().await?;
    respond(StatusCode::OK, json!({ "count": businesses.len(), "data": businesses }))
}

pub async fn society_businesses_handler(
    State(state): State<AppState>,
    Path(society_id): Path<String>,
) -> ApiResult {
    let businesses = state
        .businesses
        .list_by_society(&parse_id(&society_id, "society")?)
        .await?;
    respond(StatusCode::OK, json!({ "count": businesses.len(), "data": businesses }))
}

pub async fn review_business_handler(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
    payload: Result<Json<ReviewInput>, JsonRejection>,
) -> ApiResult {
    let business_id = parse_id(&business_id, "business")?;
    let result = state
        .engagement
        .add_review(ReviewTarget::Business, &business_id, body(payload)?)
        .await?;
    respond_data(StatusCode::CREATED, "Review added", result)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/business", post(create_business_handler))
        .route("/business/all", get(list_businesses_handler))
        .route("/business/society/{society_id}", get(society_businesses_handler))
        .route(
            "/business/{business_id}",
            get(get_business_handler)
                .patch(patch_business_handler)
                .delete(delete_business_handler),
        )
        .route("/business/{business_id}/review", post(review_business_handler))
}
