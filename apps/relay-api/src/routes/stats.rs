//! Aggregate statistics endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiErrorBody};
use crate::store::Statistics;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/stats", get(get_stats))
}

/// Stored totals plus what is live on this instance right now.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stored: Statistics,
    pub online_rooms: usize,
    pub online_users: usize,
}

#[utoipa::path(
    get,
    path = "/api/stats",
    tag = "Stats",
    responses(
        (status = 200, description = "Message and connection totals", body = StatsResponse),
        (status = 500, description = "Store unavailable", body = ApiErrorBody),
    ),
)]
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let stored = state.store.fetch_statistics().await?;
    Ok(Json(StatsResponse {
        stored,
        online_rooms: state.coordinator.online_rooms(),
        online_users: state.coordinator.online_users(),
    }))
}
