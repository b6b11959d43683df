//! Warden - uptime monitoring engine
//!
//! Probes HTTP(S) endpoints on a schedule, records results and raises
//! notifications on state changes.

mod config;
mod db;
mod notify;
mod probe;
mod scheduler;
mod web;

use config::ServerConfig;
use db::Store;
use notify::{NotificationQueue, NotificationService, NOTIFICATION_QUEUE_SIZE};
use scheduler::Manager;
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("warden=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load()?;
    tracing::info!("Starting Warden on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    // Notification dispatch
    let (notifier, notify_rx) = NotificationQueue::new(NOTIFICATION_QUEUE_SIZE);
    let notifications = NotificationService::new(store.clone()).start(notify_rx);

    // Start the engine
    let manager = Manager::new(store.clone(), cfg.engine.clone(), notifier)?;
    manager.start().await;

    // Serve until interrupted
    let server = Server::new(cfg, manager.clone());
    server.start(shutdown_signal()).await?;

    manager.stop().await;
    drop(server);
    drop(manager);
    if let Err(e) = notifications.await {
        tracing::error!("Notification service failed: {}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
