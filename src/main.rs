//! sylheti-session: Session controller daemon for the Sylheti translator
//!
//! This daemon owns the interactive translation session and provides:
//! - Debounced live translation with last-issued-wins ordering
//! - Microphone capture and speech-to-text
//! - A bounded, persisted translation history
//! - IPC server for the presentation layer
//!
//! Translation itself runs on a remote HTTP service.

mod audio;
mod config;
mod error;
mod events;
mod history;
mod ipc;
mod lang;
mod lifecycle;
mod service;
mod session;
mod store;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::audio::RecorderMicrophone;
use crate::config::Config;
use crate::events::SessionEvent;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::service::HttpService;
use crate::session::{Session, SessionHandle};
use crate::store::FileStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "sylheti-session starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        ?config.socket_path,
        server_url = %config.server_url,
        "configuration loaded"
    );

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    let store = FileStore::open(&config.store_path);
    let service = HttpService::new(&config.server_url, config.session.request_timeout)?;
    let microphone =
        RecorderMicrophone::new(&config.recorder).context("recorder command is empty")?;

    // Session -> IPC server (for broadcasting session events)
    let (event_tx, _event_rx) = broadcast::channel::<SessionEvent>(64);

    let session = Session::new(
        config.session.clone(),
        Arc::new(service),
        Arc::new(microphone),
        store,
        event_tx.clone(),
    );
    let (handle, inputs) = SessionHandle::channel(32);

    // Create IPC server with event subscription
    let server = Server::new(&config.socket_path, handle, event_tx)?;

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the session (processes UI inputs)
        _ = session.run(inputs) => {
            warn!("session exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    server.shutdown().await;

    info!("sylheti-session stopped");

    Ok(())
}
