pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod config_db;
pub mod error;
pub mod handlers;
pub mod migrations;
pub mod models;
pub mod orchestrator;
pub mod query_builder;
pub mod registry;
pub mod stats;
pub mod time_window;

use std::sync::Arc;

use clickhouse::Client;

use config::EngineConfig;
use config_db::ConfigDb;

#[derive(Clone)]
pub struct AppState {
    pub ch: Client,
    pub config_db: Arc<ConfigDb>,
    pub config: Arc<EngineConfig>,
}
