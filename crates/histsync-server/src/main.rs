//! # histsync-server
//!
//! Relay server for end-to-end encrypted shell history sync.
//!
//! The server never decrypts anything. It provides:
//! - **Fan-out** of submitted entries into one mailbox per registered device
//! - **Pull delivery** with a bounded redelivery window
//! - **Dump exchange** so an existing device can bootstrap a new one
//! - **Deletion propagation**, applied eagerly and again at each device's poll
//! - A **janitor** that resolves the published release and reclaims
//!   delivered rows

mod api;
mod auth;
mod config;
mod error;
mod janitor;
mod release;

use std::sync::{Arc, Mutex};

use histsync_shared::constants::UNKNOWN_VERSION;
use histsync_store::Database;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::release::ReleaseResolver;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,histsync_server=debug")),
        )
        .init();

    info!("Starting histsync server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    if config.release_version == UNKNOWN_VERSION && !config.test_mode {
        anyhow::bail!("RELEASE_VERSION must be set outside of test mode");
    }
    if !config.usage_stats_enabled() {
        warn!("USAGE_STATS_USER / USAGE_STATS_PASSWORD_HASH not set, usage report disabled");
    }

    // -----------------------------------------------------------------------
    // 3. Open the store and build the service context
    // -----------------------------------------------------------------------
    let db = if config.in_memory_database() {
        Database::open_in_memory()?
    } else {
        Database::open_at(&config.database_path)?
    };

    let release = ReleaseResolver::new(
        config.release_feed_url.clone(),
        config.release_download_base.clone(),
        config.release_version.clone(),
    )?;

    let http_addr = config.http_addr;
    let app_state = AppState {
        db: Arc::new(Mutex::new(db)),
        release: Arc::new(release),
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn the janitor (release resolution + garbage collection)
    // -----------------------------------------------------------------------
    janitor::spawn(app_state.clone());

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
