//! Atelier server entrypoint.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use atelier::adapters::http::{router, AppState};
use atelier::adapters::{HttpAgentClient, PostgresConversationStore};
use atelier::application::handlers::{RelayConfig, StreamRelay};
use atelier::config::AppConfig;
use atelier::ports::{AgentClient, ConversationStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_new(&config.server.log_level)
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // The pool is created here and handed to adapters as an explicit
    // handle.
    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await?;
    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database migrations applied");
    }

    let store: Arc<dyn ConversationStore> =
        Arc::new(PostgresConversationStore::new(pool.clone()));
    let agent: Arc<dyn AgentClient> = Arc::new(HttpAgentClient::new(&config.agent));
    let relay = Arc::new(StreamRelay::new(
        Arc::clone(&agent),
        Arc::clone(&store),
        RelayConfig {
            idle_timeout: config.agent.idle_timeout(),
        },
    ));

    let state = AppState::new(store, agent, relay);
    let request_timeout = Duration::from_secs(config.server.request_timeout_secs);

    let app = router(state, request_timeout)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config));

    let addr = config.server.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "atelier listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    info!("shutdown complete");
    Ok(())
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("shutdown signal received");
}
