//! Live scheduler/worker status and the daemon event stream.
//!
//! The status snapshot is kept in memory only. Every change is pushed to
//! subscribers (RPC connections, WebSocket clients) as a [`DaemonEvent`], so
//! clients do not have to poll `get_status`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};

use super::models::{CurrentJob, Status};

const EVENT_CAPACITY: usize = 64;

/// Events pushed to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DaemonEvent {
    /// The status snapshot changed; carries the new snapshot.
    StatusChanged(Status),
    /// The job store changed (CRUD, scheduling or a finished run).
    JobUpdated,
}

/// Thread-safe holder of the current [`Status`].
///
/// Cloned into every component through `AppContext`.
#[derive(Clone)]
pub struct StatusPublisher {
    inner: Arc<RwLock<Status>>,
    events: broadcast::Sender<DaemonEvent>,
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusPublisher {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(Status::default())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DaemonEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> Status {
        self.inner.read().await.clone()
    }

    /// Mutate the snapshot and publish the result.
    pub async fn update(&self, f: impl FnOnce(&mut Status)) {
        let mut status = self.inner.write().await;
        f(&mut status);
        // No subscribers is not an error.
        let _ = self.events.send(DaemonEvent::StatusChanged(status.clone()));
    }

    pub async fn set_running(&self, running: bool) {
        self.update(|s| s.running = running).await;
    }

    pub async fn set_queue_size(&self, queue_size: usize) {
        self.update(|s| s.queue_size = queue_size).await;
    }

    pub async fn set_current_job(&self, job: Option<CurrentJob>) {
        self.update(|s| s.current_job = job).await;
    }

    pub async fn record_tick(&self, at: DateTime<Utc>) {
        self.update(|s| s.last_tick = Some(at)).await;
    }

    pub fn job_updated(&self) {
        let _ = self.events.send(DaemonEvent::JobUpdated);
    }
}
