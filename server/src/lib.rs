pub mod assets;
pub mod config;
pub mod database;
pub mod logging;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod models;
pub mod server;
pub mod service;
pub mod state;

use crate::assets::LocalAssetStore;
use crate::config::Config;
use crate::database::SqliteRecordStore;
use crate::state::AppState;
use std::sync::Arc;

/// Boots the photo server from the environment and runs until Ctrl-C.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    config::load_env_file();
    let config = Config::from_env()?;

    let records = SqliteRecordStore::open(&config.database_path)?;
    records.ping()?;
    tracing::info!(path = %config.database_path.display(), "record store ready");

    let assets = LocalAssetStore::new(&config.asset_dir, config.public_url.clone())?;
    tracing::info!(dir = %config.asset_dir.display(), public_url = %config.public_url, "asset store ready");

    let app_state = AppState::new(Arc::new(records), Arc::new(assets));
    server::start_server(app_state, config.socket_addr(), config.max_upload_bytes).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}
