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
use serde_json::json;

use super::{body, parse_id, query, respond, respond_data, ApiResult};
use crate::app_state::AppState;
use crate::models::society::NewSociety;

pub async fn create_society_handler(
    State(state): State<AppState>,
    payload: Result<Json<NewSociety>, JsonRejection>,
) -> ApiResult {
    let society = state.societies.create(body(payload)?).await?;
    respond_data(StatusCode::CREATED, "Society created", society)
}

pub async fn list_societies_handler(State(state): State<AppState>) -> ApiResult {
    let societies = state.societies.list().await?;
    respond(StatusCode::OK, json!({ "count": societies.len(), "data": societies }))
}

pub async fn get_society_handler(
    State(state): State<AppState>,
    Path(society_id): Path<String>,
) -> ApiResult {
    let society = state.societies.get(&parse_id(&society_id, "society")?).await?;
    respond(StatusCode::OK, json!({ "data": society }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResidentCountQuery {
    pub society_id: Option<String>,
}

pub async fn total_residents_handler(
    State(state): State<AppState>,
    params: Result<Query<ResidentCountQuery>, QueryRejection>,
) -> ApiResult {
    let society_id = match query(params)?.society_id {
        Some(raw) => Some(parse_id(&raw, "society")?),
        None => None,
    };
    let count = state.societies.total_residents(society_id.as_ref()).await?;
    respond(StatusCode::OK, json!({ "count": count }))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/society", post(create_society_handler))
        .route("/society/all", get(list_societies_handler))
        .route("/society/total-residents/count", get(total_residents_handler))
        .route("/society/{society_id}", get(get_society_handler))
}
