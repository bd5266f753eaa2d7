//! # courier-client
//!
//! Headless Courier node. Imports the configured exchange directory, keeps
//! it in sync with the directory watcher and logs every repository,
//! session and notification change as JSON until interrupted.

use anyhow::Context;
use courier_shared::constants::APP_NAME;
use courier_client::{events, App, ClientConfig};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    courier_client::init_tracing();

    info!("Starting {} v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Wire components and open the exchange directory
    // -----------------------------------------------------------------------
    let app = App::new(config);
    events::log_events(&app);

    match app.start().context("Failed to open exchange directory")? {
        Some(stats) => info!(
            users = stats.users_imported,
            messages = stats.messages_imported,
            skipped = stats.files_skipped,
            "Exchange directory ready"
        ),
        None => warn!(
            "No exchange directory configured, set COURIER_EXCHANGE_DIR or choose one from a client"
        ),
    }

    // -----------------------------------------------------------------------
    // 4. Run until Ctrl+C
    // -----------------------------------------------------------------------
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received");
    app.shutdown();
    info!("{} stopped", APP_NAME);

    Ok(())
}
