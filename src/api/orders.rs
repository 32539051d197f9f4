use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;

use super::{body, parse_id, query, respond, respond_data, ApiResult};
use crate::app_state::AppState;
use crate::models::common::DeliveryInfo;
use crate::services::{OrderTarget, PageRequest};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertOrderRequest {
    pub user_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub delivery: DeliveryInfo,
}

fn default_quantity() -> u32 {
    1
}

pub async fn user_orders_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    page: Result<Query<PageRequest>, QueryRejection>,
) -> ApiResult {
    let user_id = parse_id(&user_id, "user")?;
    let page = state.unified_orders.user_orders(&user_id, query(page)?).await?;
    respond(StatusCode::OK, page)
}

pub async fn user_events_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    page: Result<Query<PageRequest>, QueryRejection>,
) -> ApiResult {
    let user_id = parse_id(&user_id, "user")?;
    let page = state.unified_orders.events_for_user(&user_id, query(page)?).await?;
    respond(StatusCode::OK, page)
}

pub async fn event_registrations_handler(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    page: Result<Query<PageRequest>, QueryRejection>,
) -> ApiResult {
    let event_id = parse_id(&event_id, "event")?;
    let roster = state.unified_orders.event_roster(&event_id, query(page)?).await?;
    respond(StatusCode::OK, roster)
}

async fn upsert(
    state: AppState,
    target: OrderTarget,
    entity_id: &str,
    label: &str,
    request: UpsertOrderRequest,
) -> ApiResult {
    let entity_id = parse_id(entity_id, label)?;
    let user_id = parse_id(&request.user_id, "user")?;
    let result = state
        .orders
        .upsert_order(target, &entity_id, &user_id, request.quantity, request.delivery)
        .await?;
    respond_data(StatusCode::OK, "Order placed", result)
}

pub async fn upsert_wholesale_order_handler(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
    payload: Result<Json<UpsertOrderRequest>, JsonRejection>,
) -> ApiResult {
    upsert(state, OrderTarget::Wholesale, &deal_id, "deal", body(payload)?).await
}

pub async fn upsert_business_order_handler(
    State(state): State<AppState>,
    Path(business_id): Path<String>,
    payload: Result<Json<UpsertOrderRequest>, JsonRejection>,
) -> ApiResult {
    upsert(state, OrderTarget::Business, &business_id, "business", body(payload)?).await
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders/user/{user_id}", get(user_orders_handler))
        .route("/orders/user/{user_id}/events", get(user_events_handler))
        .route("/orders/event/{event_id}/registrations", get(event_registrations_handler))
        .route("/orders/wholesale/{deal_id}/upsert", post(upsert_wholesale_order_handler))
        .route("/orders/business/{business_id}/upsert", post(upsert_business_order_handler))
}
