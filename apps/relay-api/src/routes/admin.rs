//! Manually triggered retention sweeps.

use axum::extract::{Query, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth::middleware::AdminKey;
use crate::config::days;
use crate::error::{ApiError, ApiErrorBody};
use crate::retention::SweepReport;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/cleanup/permanent", post(cleanup_permanent))
        .route("/admin/cleanup/temporary", post(cleanup_temporary))
}

#[derive(Debug, Default, Deserialize)]
pub struct CleanupParams {
    pub days: Option<u64>,
}

#[utoipa::path(
    post,
    path = "/api/admin/cleanup/permanent",
    tag = "Admin",
    security(("api_key" = [])),
    params(
        ("days" = Option<u64>, Query, description = "Delete messages older than this many days (default from config)"),
    ),
    responses(
        (status = 200, description = "Sweep finished", body = SweepReport),
        (status = 400, description = "Invalid age", body = ApiErrorBody),
        (status = 401, description = "Missing or wrong API key", body = ApiErrorBody),
    ),
)]
pub async fn cleanup_permanent(
    _admin: AdminKey,
    State(state): State<AppState>,
    Query(params): Query<CleanupParams>,
) -> Result<Json<SweepReport>, ApiError> {
    let max_age = match params.days {
        Some(0) => return Err(ApiError::invalid_field("days", "days must be at least 1")),
        Some(n) => days(n),
        None => state.retention.permanent_retention(),
    };

    let report = state.retention.sweep_permanent_rooms(max_age).await;
    tracing::info!(deleted = report.deleted_messages, "manual permanent-room cleanup");
    Ok(Json(report))
}

#[utoipa::path(
    post,
    path = "/api/admin/cleanup/temporary",
    tag = "Admin",
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Sweep finished", body = SweepReport),
        (status = 401, description = "Missing or wrong API key", body = ApiErrorBody),
    ),
)]
pub async fn cleanup_temporary(
    _admin: AdminKey,
    State(state): State<AppState>,
) -> Result<Json<SweepReport>, ApiError> {
    let report = state.retention.sweep_temporary_rooms().await?;
    tracing::info!(deleted = report.deleted_messages, "manual temporary-room cleanup");
    Ok(Json(report))
}
