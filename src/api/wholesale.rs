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
use crate::models::wholesale_deal::{DealPatchRequest, NewDeal};
use crate::services::{ReviewInput, ReviewTarget};

pub async fn create_deal_handler(
    State(state): State<AppState>,
    payload: Result<Json<NewDeal>, JsonRejection>,
) -> ApiResult {
    let deal = state.deals.create(body(payload)?).await?;
    respond_data(StatusCode::CREATED, "Wholesale deal created", deal)
}

pub async fn get_deal_handler(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
) -> ApiResult {
    let deal = state.deals.get(&parse_id(&deal_id, "deal")?).await?;
    respond(StatusCode::OK, json!({ "data": deal }))
}

pub async fn patch_deal_handler(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
    payload: Result<Json<DealPatchRequest>, JsonRejection>,
) -> ApiResult {
    let deal_id = parse_id(&deal_id, "deal")?;
    let deal = state.deals.patch(&deal_id, body(payload)?).await?;
    respond_data(StatusCode::OK, "Wholesale deal updated", deal)
}

pub async fn delete_deal_handler(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
) -> ApiResult {
    let deal_id = parse_id(&deal_id, "deal")?;
    state.deals.delete(&deal_id).await?;
    respond(StatusCode::OK, json!({ "message": "Wholesale deal deleted", "id": deal_id }))
}

pub async fn society_deals_handler(
    State(state): State<AppState>,
    Path(society_id): Path<String>,
) -> ApiResult {
    let deals = state
        .deals
        .list_by_society(&parse_id(&society_id, "society")?)
        .await?;
    respond(StatusCode::OK, json!({ "count": deals.len(), "data": deals }))
}

pub async fn user_deals_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult {
    let deals = state.deals.list_by_owner(&parse_id(&user_id, "user")?).await?;
    respond(StatusCode::OK, json!({ "count": deals.len(), "data": deals }))
}

pub async fn expire_deals_handler(
    State(state): State<AppState>,
    Path(society_id): Path<String>,
) -> ApiResult {
    let sweep = state.deals.expire(&parse_id(&society_id, "society")?).await?;
    respond_data(StatusCode::OK, "Expired deals updated", sweep)
}

pub async fn review_deal_handler(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
    payload: Result<Json<ReviewInput>, JsonRejection>,
) -> ApiResult {
    let deal_id = parse_id(&deal_id, "deal")?;
    let result = state
        .engagement
        .add_review(ReviewTarget::Wholesale, &deal_id, body(payload)?)
        .await?;
    respond_data(StatusCode::CREATED, "Review added", result)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/wholesale/create", post(create_deal_handler))
        .route("/wholesale/society/{society_id}", get(society_deals_handler))
        .route("/wholesale/user/{user_id}", get(user_deals_handler))
        .route("/wholesale/expire/{society_id}", post(expire_deals_handler))
        .route(
            "/wholesale/{deal_id}",
            get(get_deal_handler)
                .patch(patch_deal_handler)
                .delete(delete_deal_handler),
        )
        .route("/wholesale/{deal_id}/review", post(review_deal_handler))
}
