//! API-key extraction for the admin endpoints.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::AppState;

/// Header carrying the admin API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Proof that the request carried the configured `x-api-key`.
#[derive(Debug, Clone, Copy)]
pub struct AdminKey;

/// Rejection returned when the key is missing, wrong, or no key is configured.
pub struct AuthError {
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::unauthorized(self.message).into_response()
    }
}

impl FromRequestParts<AppState> for AdminKey {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.api_key.as_deref() else {
            tracing::warn!("admin request rejected: API_KEY is not configured");
            return Err(AuthError {
                message: "Admin API is disabled",
            });
        };

        let provided = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError {
                message: "Missing x-api-key header",
            })?;

        if provided != expected {
            return Err(AuthError {
                message: "Invalid API key",
            });
        }

        Ok(AdminKey)
    }
}
