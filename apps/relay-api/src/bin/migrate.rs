//! Applies the embedded schema migrations to the chat database.
//!
//! Usage:
//!   cargo run -p relay-api --bin relay-migrate
//!   cargo run -p relay-api --bin relay-migrate -- --test
//!
//! Reads DATABASE_URL from the environment (or .env via dotenvy). `--test`
//! targets the `<name>_test` database next to the configured one.

use std::error::Error;
use std::path::Path;

use diesel::pg::PgConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| "DATABASE_URL must be set to run migrations")?;
    let database_url = if std::env::args().any(|arg| arg == "--test") {
        test_database_url(&database_url)
    } else {
        database_url
    };

    println!("Connecting to database...");
    let mut conn = PgConnection::establish(&database_url)?;

    println!("Running pending migrations...");
    let applied = conn.run_pending_migrations(MIGRATIONS)?;

    if applied.is_empty() {
        println!("Schema is up to date.");
    } else {
        for migration in &applied {
            println!("  Applied: {migration}");
        }
        println!("{} migration(s) applied.", applied.len());
    }
    Ok(())
}

/// `postgres://host/chat?x=y` → `postgres://host/chat_test?x=y`. Already-suffixed names are kept.
fn test_database_url(database_url: &str) -> String {
    let (base, query) = match database_url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (database_url, None),
    };
    let Some((prefix, db_name)) = base.rsplit_once('/') else {
        return database_url.to_string();
    };
    if db_name.is_empty() || db_name.ends_with("_test") {
        return database_url.to_string();
    }

    let mut url = format!("{prefix}/{db_name}_test");
    if let Some(query) = query {
        url.push('?');
        url.push_str(query);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_test_suffix() {
        assert_eq!(
            test_database_url("postgres://u:p@localhost:5432/chat"),
            "postgres://u:p@localhost:5432/chat_test"
        );
        assert_eq!(
            test_database_url("postgres://localhost/chat?sslmode=disable"),
            "postgres://localhost/chat_test?sslmode=disable"
        );
        assert_eq!(
            test_database_url("postgres://localhost/chat_test"),
            "postgres://localhost/chat_test"
        );
    }
}
