use std::error::Error;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relay_api::config::Config;
use relay_api::db::pool::{self, BuildError};
use relay_api::store::{ChatStore, MemoryStore, PgStore};
use relay_api::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // .env is optional; variables may come from the process environment.
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    std::panic::set_hook(Box::new(|info| {
        tracing::error!(panic = %info, "unhandled panic");
    }));

    let config = Config::from_env();
    tracing::info!(
        port = config.port,
        history_limit = config.history_limit,
        retention_days = config.permanent_retention.as_secs() / 86_400,
        admin_enabled = config.api_key.is_some(),
        "relay-api configured"
    );

    let store = open_store(&config)?;
    let state = AppState::new(config, store);
    let background = Arc::clone(&state.retention).spawn();

    let served = serve(state.clone()).await;

    for task in &background {
        task.abort();
    }
    state.store.close().await;

    served?;
    tracing::info!("relay-api stopped");
    Ok(())
}

fn open_store(config: &Config) -> Result<Arc<dyn ChatStore>, BuildError> {
    match &config.database_url {
        Some(url) => {
            let pool = pool::connect(url, config.db_pool_size, config.db_timeout)?;
            Ok(Arc::new(PgStore::new(pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL is not set; chat history is kept in memory only");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn serve(state: AppState) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let cors = relay_api::routes::cors(&state.config.allowed_origins);

    let app = Router::new()
        .merge(relay_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "relay-api listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
