use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::Json,
    routing::{delete, get, patch, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::{body, parse_id, query, respond, respond_data, ApiResult};
use crate::app_state::AppState;
use crate::models::feed::{FeedPatchRequest, FeedType, NewFeed};
use crate::services::RsvpInput;

#[derive(Debug, Default, Deserialize)]
pub struct FeedListQuery {
    #[serde(rename = "type")]
    pub feed_type: Option<FeedType>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub user_id: String,
    pub option_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRequest {
    pub user_id: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpRequest {
    pub user_id: String,
    #[serde(flatten)]
    pub rsvp: RsvpInput,
}

pub async fn create_feed_handler(
    State(state): State<AppState>,
    payload: Result<Json<NewFeed>, JsonRejection>,
) -> ApiResult {
    let feed = state.feeds.create(body(payload)?).await?;
    respond_data(StatusCode::CREATED, "Feed created", feed)
}

pub async fn get_feed_handler(
    State(state): State<AppState>,
    Path(feed_id): Path<String>,
) -> ApiResult {
    let feed = state.feeds.get(&parse_id(&feed_id, "feed")?).await?;
    respond(StatusCode::OK, json!({ "data": feed }))
}

pub async fn patch_feed_handler(
    State(state): State<AppState>,
    Path(feed_id): Path<String>,
    payload: Result<Json<FeedPatchRequest>, JsonRejection>,
) -> ApiResult {
    let feed_id = parse_id(&feed_id, "feed")?;
    let feed = state.feeds.patch(&feed_id, body(payload)?).await?;
    respond_data(StatusCode::OK, "Feed updated", feed)
}

pub async fn delete_feed_handler(
    State(state): State<AppState>,
    Path(feed_id): Path<String>,
) -> ApiResult {
    let feed_id = parse_id(&feed_id, "feed")?;
    state.feeds.delete(&feed_id).await?;
    respond(StatusCode::OK, json!({ "message": "Feed deleted", "id": feed_id }))
}

pub async fn society_feeds_handler(
    State(state): State<AppState>,
    Path(society_id): Path<String>,
    params: Result<Query<FeedListQuery>, QueryRejection>,
) -> ApiResult {
    let society_id = parse_id(&society_id, "society")?;
    let params = query(params)?;
    let feeds = state.feeds.list_by_society(&society_id, params.feed_type).await?;
    respond(StatusCode::OK, json!({ "count": feeds.len(), "data": feeds }))
}

pub async fn user_feeds_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult {
    let feeds = state.feeds.list_by_user(&parse_id(&user_id, "user")?).await?;
    respond(StatusCode::OK, json!({ "count": feeds.len(), "data": feeds }))
}

pub async fn vote_handler(
    State(state): State<AppState>,
    Path(feed_id): Path<String>,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> ApiResult {
    let feed_id = parse_id(&feed_id, "feed")?;
    let request = body(payload)?;
    let user_id = parse_id(&request.user_id, "user")?;
    let result = state
        .engagement
        .vote(&feed_id, &user_id, &request.option_id)
        .await?;
    respond(StatusCode::OK, result)
}

pub async fn like_handler(
    State(state): State<AppState>,
    Path(feed_id): Path<String>,
    payload: Result<Json<UserRequest>, JsonRejection>,
) -> ApiResult {
    let feed_id = parse_id(&feed_id, "feed")?;
    let user_id = parse_id(&body(payload)?.user_id, "user")?;
    let result = state.engagement.toggle_like(&feed_id, &user_id).await?;
    let message = if result.liked { "Feed liked" } else { "Feed unliked" };
    respond_data(StatusCode::OK, message, result)
}

pub async fn comment_handler(
    State(state): State<AppState>,
    Path(feed_id): Path<String>,
    payload: Result<Json<CommentRequest>, JsonRejection>,
) -> ApiResult {
    let feed_id = parse_id(&feed_id, "feed")?;
    let request = body(payload)?;
    let user_id = parse_id(&request.user_id, "user")?;
    let result = state
        .engagement
        .add_comment(&feed_id, &user_id, &request.text)
        .await?;
    respond_data(StatusCode::CREATED, "Comment added", result)
}

pub async fn rsvp_handler(
    State(state): State<AppState>,
    Path(feed_id): Path<String>,
    payload: Result<Json<RsvpRequest>, JsonRejection>,
) -> ApiResult {
    let feed_id = parse_id(&feed_id, "feed")?;
    let request = body(payload)?;
    let user_id = parse_id(&request.user_id, "user")?;
    let result = state.rsvps.add_or_update(&feed_id, &user_id, request.rsvp).await?;
    let (status, message) = if result.created {
        (StatusCode::CREATED, "RSVP added")
    } else {
        (StatusCode::OK, "RSVP updated")
    };
    respond_data(status, message, result)
}

pub async fn remove_rsvp_handler(
    State(state): State<AppState>,
    Path((feed_id, user_id)): Path<(String, String)>,
) -> ApiResult {
    let feed_id = parse_id(&feed_id, "feed")?;
    let user_id = parse_id(&user_id, "user")?;
    let result = state.rsvps.remove(&feed_id, &user_id).await?;
    respond_data(StatusCode::OK, "RSVP removed", result)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/feed/create", post(create_feed_handler))
        .route("/feed/society/{society_id}", get(society_feeds_handler))
        .route("/feed/user/{user_id}", get(user_feeds_handler))
        .route("/feed/vote/{feed_id}", post(vote_handler))
        .route("/feed/comment/{feed_id}", post(comment_handler))
        .route(
            "/feed/{feed_id}",
            get(get_feed_handler)
                .patch(patch_feed_handler)
                .delete(delete_feed_handler),
        )
        .route("/feed/{feed_id}/like", patch(like_handler))
        .route("/feed/{feed_id}/rsvp", post(rsvp_handler))
        .route("/feed/{feed_id}/rsvp/{user_id}", delete(remove_rsvp_handler))
}
