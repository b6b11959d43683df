//! Notification queue and dispatch.
//!
//! The engine only ever calls [`NotificationQueue::enqueue`], which never blocks:
//! when the queue is full the event is dropped. [`NotificationService`] drains
//! the queue and fans each event out to the enabled channels.

mod slack;

pub use slack::*;

use crate::db::{NotificationChannel, Store};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Default capacity of the notification queue.
pub const NOTIFICATION_QUEUE_SIZE: usize = 100;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid channel configuration: {0}")]
    Config(String),
    #[error("webhook returned status {0}")]
    Status(u16),
}

/// Kind of notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Down,
    Up,
    Degraded,
    SslExpiring,
    Flapping,
    Stabilized,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Down => "down",
            EventType::Up => "up",
            EventType::Degraded => "degraded",
            EventType::SslExpiring => "ssl_expiring",
            EventType::Flapping => "flapping",
            EventType::Stabilized => "stabilized",
        }
    }
}

/// Everything a channel needs to render one alert.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationEvent {
    pub monitor_id: String,
    pub monitor_name: String,
    pub monitor_url: String,
    pub event_type: EventType,
    pub message: String,
    pub time: DateTime<Utc>,
}

/// A notification transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, event: &NotificationEvent) -> Result<(), NotifyError>;
}

/// Cloneable, non-blocking producer side of the notification queue.
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<NotificationEvent>,
}

impl NotificationQueue {
    /// Create a queue and the receiver a [`NotificationService`] will drain.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<NotificationEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue an event, dropping it if the queue is full.
    pub fn enqueue(&self, event: NotificationEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(
                    monitor_id = %event.monitor_id,
                    "Notification queue full, dropping {} event",
                    event.event_type.as_str()
                );
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::warn!(
                    monitor_id = %event.monitor_id,
                    "Notification service stopped, dropping {} event",
                    event.event_type.as_str()
                );
            }
        }
    }
}

/// Drains the queue and dispatches to the channels configured in the store.
pub struct NotificationService {
    store: Arc<Store>,
}

impl NotificationService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Spawn the dispatch loop. It ends once every queue handle is dropped.
    pub fn start(self, mut rx: mpsc::Receiver<NotificationEvent>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                self.dispatch(&event).await;
            }
            tracing::info!("Notification service stopped");
        })
    }

    async fn dispatch(&self, event: &NotificationEvent) {
        let channels = match self.store.get_notification_channels() {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("Failed to fetch notification channels: {}", e);
                return;
            }
        };

        for channel in channels.iter().filter(|c| c.enabled) {
            let notifier = match build_notifier(channel) {
                Ok(Some(n)) => n,
                Ok(None) => {
                    tracing::warn!("Unknown channel type: {}", channel.channel_type);
                    continue;
                }
                Err(e) => {
                    tracing::error!("Channel {} misconfigured: {}", channel.name, e);
                    continue;
                }
            };

            if let Err(e) = notifier.send(event).await {
                tracing::error!(
                    "Failed to send notification to {} ({}): {}",
                    channel.name,
                    channel.channel_type,
                    e
                );
            }
        }
    }
}

/// Build the transport for a channel, `None` for unsupported types.
pub fn build_notifier(channel: &NotificationChannel) -> Result<Option<Box<dyn Notifier>>, NotifyError> {
    match channel.channel_type.as_str() {
        "slack" => Ok(Some(Box::new(SlackNotifier::from_config(&channel.config)?))),
        _ => Ok(None),
    }
}
