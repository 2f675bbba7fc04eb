use std::time::Duration;

use deadpool::Runtime;
pub use diesel_async::pooled_connection::deadpool::BuildError;
use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;

pub type DbPool = Pool<AsyncPgConnection>;

/// Create a Diesel async connection pool.
///
/// Connections are opened lazily, so this succeeds even when the database
/// is not reachable yet. Checkouts and connection attempts give up after
/// `timeout` instead of waiting forever.
pub fn connect(
    database_url: &str,
    max_size: usize,
    timeout: Duration,
) -> Result<DbPool, BuildError> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    let pool = Pool::builder(manager)
        .max_size(max_size)
        .wait_timeout(Some(timeout))
        .create_timeout(Some(timeout))
        .runtime(Runtime::Tokio1)
        .build()?;

    tracing::info!(max_size, timeout_secs = timeout.as_secs(), "database pool created");

    Ok(pool)
}
