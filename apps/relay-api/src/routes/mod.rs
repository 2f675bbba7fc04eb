pub mod admin;
pub mod health;
pub mod rooms;
pub mod stats;

use axum::http::{HeaderName, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::auth::middleware::API_KEY_HEADER;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .nest(
            "/api",
            stats::router()
                .merge(rooms::router())
                .merge(admin::router()),
        )
}

/// CORS policy: any origin when `origins` is empty, otherwise exactly the listed ones.
pub fn cors(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            HeaderName::from_static(API_KEY_HEADER),
        ]);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(API_KEY_HEADER))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        stats::get_stats,
        rooms::list_rooms,
        rooms::room_messages,
        rooms::room_logs,
        rooms::user_messages,
        admin::cleanup_permanent,
        admin::cleanup_temporary,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Store records
            crate::store::Statistics,
            crate::store::HistoryEntry,
            crate::store::ConnectionLogEntry,
            crate::store::ConnectionAction,
            crate::store::UserMessage,
            crate::store::RoomMessageCount,
            // Route responses
            health::HealthResponse,
            stats::StatsResponse,
            crate::retention::SweepReport,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Stats", description = "Aggregate statistics"),
        (name = "Rooms", description = "Room history and logs"),
        (name = "Admin", description = "Retention maintenance"),
    )
)]
pub struct ApiDoc;
