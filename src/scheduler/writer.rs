//! Side-effect writes (events, outages) applied off the ingestion path.
//!
//! The result processor submits writes without waiting; one writer task
//! applies them in submission order.

use crate::db::{DbError, OutageType, Store};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWrite {
    CreateEvent {
        monitor_id: String,
        event_type: String,
        message: String,
        at: DateTime<Utc>,
    },
    OpenOutage {
        monitor_id: String,
        outage_type: OutageType,
        summary: String,
        at: DateTime<Utc>,
    },
    CloseOutage {
        monitor_id: String,
        at: DateTime<Utc>,
    },
}

impl StoreWrite {
    pub fn monitor_id(&self) -> &str {
        match self {
            StoreWrite::CreateEvent { monitor_id, .. }
            | StoreWrite::OpenOutage { monitor_id, .. }
            | StoreWrite::CloseOutage { monitor_id, .. } => monitor_id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            StoreWrite::CreateEvent { .. } => "event",
            StoreWrite::OpenOutage { .. } => "outage open",
            StoreWrite::CloseOutage { .. } => "outage close",
        }
    }
}

/// Apply one write to the store.
pub fn apply_write(store: &Store, write: &StoreWrite) -> Result<(), DbError> {
    match write {
        StoreWrite::CreateEvent {
            monitor_id,
            event_type,
            message,
            at,
        } => store.create_event(monitor_id, event_type, message, *at),
        StoreWrite::OpenOutage {
            monitor_id,
            outage_type,
            summary,
            at,
        } => store.open_outage(monitor_id, *outage_type, summary, *at),
        StoreWrite::CloseOutage { monitor_id, at } => {
            store.close_outage(monitor_id, *at).map(|_| ())
        }
    }
}

/// Producer handle for the write queue.
#[derive(Clone)]
pub struct StoreWriter {
    tx: mpsc::Sender<StoreWrite>,
}

impl StoreWriter {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<StoreWrite>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue a write. Dropped with a warning when the queue is full.
    pub fn submit(&self, write: StoreWrite) {
        if let Err(e) = self.tx.try_send(write) {
            let write = match e {
                mpsc::error::TrySendError::Full(w) | mpsc::error::TrySendError::Closed(w) => w,
            };
            tracing::warn!(
                monitor_id = %write.monitor_id(),
                "Write queue unavailable, dropping {}",
                write.kind()
            );
        }
    }
}

/// Spawn the writer task. It exits once every [`StoreWriter`] is dropped and
/// the queue is drained.
pub fn spawn_store_writer(store: Arc<Store>, mut rx: mpsc::Receiver<StoreWrite>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(write) = rx.recv().await {
            if let Err(e) = apply_write(&store, &write) {
                tracing::error!(
                    monitor_id = %write.monitor_id(),
                    "Failed to persist {}: {}",
                    write.kind(),
                    e
                );
            }
        }
        tracing::debug!("Store writer stopped");
    })
}
