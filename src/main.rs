mod aggregator;
mod classifier;
mod config;
mod config_db;
mod error;
mod handlers;
mod migrations;
mod models;
mod orchestrator;
mod query_builder;
mod registry;
mod stats;
mod time_window;

use axum::{routing::get, routing::post, Router};
use clickhouse::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use config::EngineConfig;
use config_db::ConfigDb;

#[derive(Clone)]
pub struct AppState {
    pub ch: Client,
    pub config_db: Arc<ConfigDb>,
    pub config: Arc<EngineConfig>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("signal_engine=debug,tower_http=debug")
        }))
        .init();

    let config_path = std::env::var("SIGNAL_ENGINE_CONFIG").unwrap_or_else(|_| "./config.toml".to_string());
    let config = Arc::new(EngineConfig::load(&config_path)?);
    tracing::info!(path = %config_path, "engine config loaded");

    let ch = Client::default()
        .with_url(&config.storage.clickhouse_url)
        .with_database(&config.storage.clickhouse_database)
        .with_user(std::env::var("CLICKHOUSE_USER").unwrap_or_else(|_| "default".to_string()))
        .with_password(std::env::var("CLICKHOUSE_PASSWORD").unwrap_or_default());

    migrations::run(
        &config.storage.clickhouse_url,
        &std::env::var("CLICKHOUSE_USER").unwrap_or_else(|_| "default".to_string()),
        &std::env::var("CLICKHOUSE_PASSWORD").unwrap_or_default(),
    )
    .await?;

    let config_db = Arc::new(ConfigDb::open(&config.storage.registry_db_path)?);
    tracing::info!(path = %config.storage.registry_db_path, "entity group registry opened");

    let state = AppState { ch, config_db, config };

    let app = Router::new()
        .route("/api/analytics/signals/advanced", post(handlers::signals::advanced))
        .route("/api/analytics/signals", get(handlers::signals::simple))
        .route(
            "/api/entity-groups",
            get(handlers::entity_groups::list).post(handlers::entity_groups::create),
        )
        .route(
            "/api/entity-groups/suggest-name",
            get(handlers::entity_groups::suggest_name),
        )
        .route(
            "/api/entity-groups/available-entities",
            get(handlers::entity_groups::available_entities),
        )
        .route(
            "/api/entity-groups/{id}",
            get(handlers::entity_groups::get)
                .put(handlers::entity_groups::update)
                .delete(handlers::entity_groups::delete),
        )
        .route("/api/entity-groups/{id}/activate", post(handlers::entity_groups::activate))
        .route("/api/entity-groups/{id}/deactivate", post(handlers::entity_groups::deactivate))
        .route("/healthz", get(handlers::health::healthz))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    tracing::info!("maude-signal-engine listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
