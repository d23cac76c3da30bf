//! # signwall-player
//!
//! Runs one screen of a video wall until Ctrl-C.
//!
//! `signwall-player unpair` forgets the device's pairing and cache, so the
//! next start pairs again with `SIGNWALL_PAIRING_CODE`.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use signwall_player::pairing::{resolve_screen_id, unpair};
use signwall_player::{DeviceRuntime, Exit, HttpBackend, Libp2pLink, PlayerConfig};
use signwall_store::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,signwall_player=debug,signwall_net=debug,signwall_store=info")
        }))
        .init();

    info!("Starting signwall player v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = PlayerConfig::from_env();
    info!(
        api = %config.api_url,
        poll_secs = config.poll_interval.as_secs(),
        listen_port = config.listen_port,
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Open the cache and the backend
    // -----------------------------------------------------------------------
    let mut db = match &config.db_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    info!(path = ?db.path(), "Cache opened");

    if std::env::args().nth(1).as_deref() == Some("unpair") {
        unpair(&mut db)?;
        return Ok(());
    }

    let backend = Arc::new(HttpBackend::new(
        config.api_url.clone(),
        config.api_token.clone(),
    )?);

    // -----------------------------------------------------------------------
    // 4. Pair if needed
    // -----------------------------------------------------------------------
    let screen_id = resolve_screen_id(&config, &db, backend.as_ref()).await?;
    info!(screen = %screen_id, "Screen identity");
    let links = Libp2pLink::from_config(&config);

    // -----------------------------------------------------------------------
    // 5. Play until Ctrl-C
    // -----------------------------------------------------------------------
    let runtime = DeviceRuntime::new(config, screen_id, db, backend, links);
    let exit = runtime
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            info!("Ctrl-C received");
        })
        .await?;

    if exit == Exit::Unpaired {
        info!("Device unpaired; set SIGNWALL_PAIRING_CODE to pair it again");
    }
    Ok(())
}
