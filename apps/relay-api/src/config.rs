use std::time::Duration;

/// Default number of history messages replayed to a joining connection.
pub const DEFAULT_HISTORY_LIMIT: i64 = 100;

/// Upper bound for any history/log query.
pub const MAX_HISTORY_LIMIT: i64 = 1000;

/// Relay configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string. `None` runs against the in-memory store.
    pub database_url: Option<String>,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Value admins must present in the `x-api-key` header. `None` disables admin endpoints.
    pub api_key: Option<String>,
    /// CORS origins. Empty means any origin.
    pub allowed_origins: Vec<String>,
    /// Number of messages sent as `room history` on join, already clamped into [1, 1000].
    pub history_limit: i64,
    /// Messages in permanent rooms older than this are purged by the daily sweep.
    pub permanent_retention: Duration,
    /// How often the registry reaper looks for orphaned sessions.
    pub reaper_interval: Duration,
    /// Maximum number of pooled database connections.
    pub db_pool_size: usize,
    /// Upper bound on waiting for, or opening, a pooled database connection.
    pub db_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional; malformed numbers fall back to their defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: optional_var("DATABASE_URL"),
            port: parsed_var("PORT").unwrap_or(3000),
            api_key: optional_var("API_KEY"),
            allowed_origins: optional_var("ALLOWED_ORIGINS")
                .map(|v| parse_origins(&v))
                .unwrap_or_default(),
            history_limit: clamp_limit(parsed_var("HISTORY_LIMIT"), DEFAULT_HISTORY_LIMIT),
            permanent_retention: days(parsed_var("PERMANENT_RETENTION_DAYS").unwrap_or(30)),
            reaper_interval: Duration::from_secs(
                parsed_var("REAPER_INTERVAL_SECS")
                    .filter(|secs: &u64| *secs > 0)
                    .unwrap_or(60),
            ),
            db_pool_size: parsed_var("DB_POOL_SIZE")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(10),
            db_timeout: Duration::from_secs(
                parsed_var("DB_TIMEOUT_SECS")
                    .filter(|secs: &u64| *secs > 0)
                    .unwrap_or(5),
            ),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            port: 3000,
            api_key: None,
            allowed_origins: Vec::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            permanent_retention: days(30),
            reaper_interval: Duration::from_secs(60),
            db_pool_size: 10,
            db_timeout: Duration::from_secs(5),
        }
    }
}

/// Clamp a requested limit into `[1, MAX_HISTORY_LIMIT]`, using `default` when absent.
pub fn clamp_limit(requested: Option<i64>, default: i64) -> i64 {
    requested.unwrap_or(default).clamp(1, MAX_HISTORY_LIMIT)
}

pub fn days(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(24 * 60 * 60))
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
