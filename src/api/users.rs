use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde_json::json;

use super::{body, parse_id, respond, respond_data, ApiResult};
use crate::app_state::AppState;
use crate::infrastructure::middleware::Vc;
use crate::models::user::{NewUser, UserPatchRequest};

/// Registration hands back a bearer token for the new user alongside the document.
pub async fn create_user_handler(
    State(state): State<AppState>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> ApiResult {
    let user = state.users.create(body(payload)?).await?;
    let token = state.tokens.issue(&user.id)?;
    respond(
        StatusCode::CREATED,
        json!({ "message": "User created", "data": user, "token": token }),
    )
}

pub async fn get_user_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult {
    let user = state.users.get(&parse_id(&user_id, "user")?).await?;
    respond(StatusCode::OK, json!({ "data": user }))
}

pub async fn patch_user_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    payload: Result<Json<UserPatchRequest>, JsonRejection>,
) -> ApiResult {
    let user_id = parse_id(&user_id, "user")?;
    let user = state.users.patch(&user_id, body(payload)?).await?;
    respond_data(StatusCode::OK, "User updated", user)
}

pub async fn society_users_handler(
    State(state): State<AppState>,
    Path(society_id): Path<String>,
) -> ApiResult {
    let users = state
        .users
        .list_by_society(&parse_id(&society_id, "society")?)
        .await?;
    respond(StatusCode::OK, json!({ "count": users.len(), "data": users }))
}

pub async fn pending_users_handler(
    State(state): State<AppState>,
    Path(society_id): Path<String>,
) -> ApiResult {
    let users = state
        .users
        .pending_by_society(&parse_id(&society_id, "society")?)
        .await?;
    respond(StatusCode::OK, json!({ "count": users.len(), "data": users }))
}

pub async fn user_order_pointers_handler(
    State(state): State<AppState>,
    vc: Vc,
    Path(user_id): Path<String>,
) -> ApiResult {
    vc.require_user()?;
    let orders = state.users.orders(&parse_id(&user_id, "user")?).await?;
    respond(StatusCode::OK, json!({ "count": orders.len(), "data": orders }))
}

pub async fn sync_business_links_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult {
    let user = state
        .businesses
        .sync_owner_links(&parse_id(&user_id, "user")?)
        .await?;
    respond_data(StatusCode::OK, "Business links synced", user.business_ids)
}

pub async fn refresh_business_link_statuses_handler(
    State(state): State<AppState>,
    vc: Vc,
    Path(user_id): Path<String>,
) -> ApiResult {
    vc.require_user()?;
    let user = state
        .businesses
        .refresh_owner_link_statuses(&parse_id(&user_id, "user")?)
        .await?;
    respond_data(StatusCode::OK, "Business link statuses refreshed", user.business_ids)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user_handler))
        .route("/users/society/{society_id}", get(society_users_handler))
        .route("/users/society/{society_id}/pending", get(pending_users_handler))
        .route("/users/{user_id}", get(get_user_handler).patch(patch_user_handler))
        .route("/users/{user_id}/orders", get(user_order_pointers_handler))
        .route("/users/{user_id}/business-links/sync", post(sync_business_links_handler))
        .route(
            "/users/{user_id}/business-links/status",
            put(refresh_business_link_statuses_handler),
        )
}
