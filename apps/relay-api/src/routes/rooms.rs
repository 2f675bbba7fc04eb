//! Read-only room queries: stored rooms, history, connection logs, per-user messages.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::config::clamp_limit;
use crate::error::{ApiError, ApiErrorBody};
use crate::gateway::validate;
use crate::store::{ConnectionLogEntry, HistoryEntry, RoomMessageCount, UserMessage};
use crate::AppState;

/// Default page size for connection logs and per-user messages.
const DEFAULT_LOG_LIMIT: i64 = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms", get(list_rooms))
        .route("/rooms/{room}/messages", get(room_messages))
        .route("/rooms/{room}/logs", get(room_logs))
        .route(
            "/rooms/{room}/users/{username}/messages",
            get(user_messages),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/rooms",
    tag = "Rooms",
    responses(
        (status = 200, description = "Rooms with stored messages", body = [RoomMessageCount]),
        (status = 500, description = "Store unavailable", body = ApiErrorBody),
    ),
)]
pub async fn list_rooms(
    State(state): State<AppState>,
) -> Result<Json<Vec<RoomMessageCount>>, ApiError> {
    Ok(Json(state.store.list_rooms_with_message_counts().await?))
}

#[utoipa::path(
    get,
    path = "/api/rooms/{room}/messages",
    tag = "Rooms",
    params(
        ("room" = String, Path, description = "Room name"),
        ("limit" = Option<i64>, Query, description = "Number of messages (1-1000, default 100)"),
    ),
    responses(
        (status = 200, description = "Most recent messages, oldest first", body = [HistoryEntry]),
        (status = 400, description = "Invalid room name", body = ApiErrorBody),
    ),
)]
pub async fn room_messages(
    State(state): State<AppState>,
    Path(room): Path<String>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let room = validate::room(&room)?;
    let limit = clamp_limit(params.limit, state.config.history_limit);
    Ok(Json(state.store.fetch_room_history(room, limit).await?))
}

#[utoipa::path(
    get,
    path = "/api/rooms/{room}/logs",
    tag = "Rooms",
    params(
        ("room" = String, Path, description = "Room name"),
        ("limit" = Option<i64>, Query, description = "Number of entries (1-1000, default 50)"),
    ),
    responses(
        (status = 200, description = "Join, leave and disconnect events, oldest first", body = [ConnectionLogEntry]),
        (status = 400, description = "Invalid room name", body = ApiErrorBody),
    ),
)]
pub async fn room_logs(
    State(state): State<AppState>,
    Path(room): Path<String>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<ConnectionLogEntry>>, ApiError> {
    let room = validate::room(&room)?;
    let limit = clamp_limit(params.limit, DEFAULT_LOG_LIMIT);
    Ok(Json(state.store.fetch_connection_logs(room, limit).await?))
}

#[utoipa::path(
    get,
    path = "/api/rooms/{room}/users/{username}/messages",
    tag = "Rooms",
    params(
        ("room" = String, Path, description = "Room name"),
        ("username" = String, Path, description = "Author"),
        ("limit" = Option<i64>, Query, description = "Number of messages (1-1000, default 50)"),
    ),
    responses(
        (status = 200, description = "The user's messages in this room, oldest first", body = [UserMessage]),
        (status = 400, description = "Invalid room name or username", body = ApiErrorBody),
    ),
)]
pub async fn user_messages(
    State(state): State<AppState>,
    Path((room, username)): Path<(String, String)>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<UserMessage>>, ApiError> {
    let room = validate::room(&room)?;
    let username = validate::username(&username)?;
    let limit = clamp_limit(params.limit, DEFAULT_LOG_LIMIT);
    Ok(Json(
        state
            .store
            .fetch_user_messages(username, room, limit)
            .await?,
    ))
}
