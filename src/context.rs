use std::sync::Arc;

use tokio_rusqlite::Connection;

use crate::config::AppConfig;
use crate::core::{ExecutionQueue, PathLocks, StatusPublisher};

/// Shared handles passed to the scheduler, the worker and every request
/// handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub db: Connection,
    pub status: StatusPublisher,
    pub queue: Arc<ExecutionQueue>,
    pub locks: PathLocks,
}

impl AppContext {
    pub fn new(config: AppConfig, db: Connection) -> Self {
        let status = StatusPublisher::new();
        Self {
            config: Arc::new(config),
            db,
            queue: Arc::new(ExecutionQueue::new(status.clone())),
            status,
            locks: PathLocks::new(),
        }
    }
}
