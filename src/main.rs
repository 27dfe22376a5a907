//! Room Relay - Entry Point
//!
//! Builds the shared services, starts the idle room reaper and accepts
//! WebSocket connections until Ctrl-C.

use std::env;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use room_relay::{
    handle_connection, AppError, ConnectionHub, IdleRoomReaper, RateLimiter, RelayConfig,
    RoomBroadcaster, RoomStore,
};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=room_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("room_relay=info")),
        )
        .init();

    let mut config = RelayConfig::from_env()?;

    // A bind address on the command line wins over the environment
    if let Some(addr) = env::args().nth(1) {
        config.bind_addr = addr;
    }

    let store = Arc::new(RoomStore::new(config.max_per_room, config.room_ttl));
    let limiter = Arc::new(RateLimiter::new());
    let hub = Arc::new(ConnectionHub::new());

    let cancel = CancellationToken::new();
    let reaper = IdleRoomReaper::new(Arc::clone(&store), config.reaper_period);
    let reaper_task = tokio::spawn(reaper.run(cancel.clone()));

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Room relay listening on {}", config.bind_addr);

    let broadcaster = Arc::new(RoomBroadcaster::new(
        store,
        limiter,
        Arc::clone(&hub),
        config,
    ));

    // Connection accept loop
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let hub = Arc::clone(&hub);
                    let broadcaster = Arc::clone(&broadcaster);

                    // Spawn handler task for each connection
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, hub, broadcaster).await {
                            error!("Connection handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    cancel.cancel();
    let _ = reaper_task.await;

    info!("Room relay stopped");
    Ok(())
}
