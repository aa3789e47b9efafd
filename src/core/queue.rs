//! FIFO execution queue feeding the single backup worker.
//!
//! Scheduled and run-now triggers share this queue. There is at most one
//! pending entry per job id; a second trigger for a pending job is coalesced.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use super::models::{QueueEntry, TriggerReason};
use super::status::StatusPublisher;

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueueEntry>,
    /// Job popped by the worker and not yet finished.
    running: Option<String>,
}

pub struct ExecutionQueue {
    state: Mutex<QueueState>,
    ready: Notify,
    status: StatusPublisher,
}

impl ExecutionQueue {
    pub fn new(status: StatusPublisher) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            ready: Notify::new(),
            status,
        }
    }

    /// Append a job to the tail. Returns false when the job already has a
    /// pending entry.
    pub async fn push(&self, job_id: &str, reason: TriggerReason, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock().await;
        if state.pending.iter().any(|e| e.job_id == job_id) {
            return false;
        }

        state.pending.push_back(QueueEntry {
            job_id: job_id.to_string(),
            reason,
            enqueued_at: now,
        });
        self.status.set_queue_size(state.pending.len()).await;
        drop(state);

        self.ready.notify_one();
        true
    }

    /// Take the oldest entry and mark its job as running.
    pub async fn pop(&self) -> Option<QueueEntry> {
        let mut state = self.state.lock().await;
        let entry = state.pending.pop_front()?;
        state.running = Some(entry.job_id.clone());
        self.status.set_queue_size(state.pending.len()).await;
        Some(entry)
    }

    /// Wait for the next entry. Returns None once `cancel` fires.
    pub async fn next(&self, cancel: &CancellationToken) -> Option<QueueEntry> {
        loop {
            if let Some(entry) = self.pop().await {
                return Some(entry);
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = self.ready.notified() => {}
            }
        }
    }

    /// Clear the running marker set by [`pop`](Self::pop).
    pub async fn finish(&self, job_id: &str) {
        let mut state = self.state.lock().await;
        if state.running.as_deref() == Some(job_id) {
            state.running = None;
        }
    }

    /// Drop the pending entry of a job. A running execution is unaffected.
    pub async fn remove(&self, job_id: &str) -> bool {
        let mut state = self.state.lock().await;
        let before = state.pending.len();
        state.pending.retain(|e| e.job_id != job_id);
        let removed = state.pending.len() != before;
        if removed {
            self.status.set_queue_size(state.pending.len()).await;
        }
        removed
    }

    /// True if the job is pending or currently running.
    pub async fn is_live(&self, job_id: &str) -> bool {
        let state = self.state.lock().await;
        state.running.as_deref() == Some(job_id) || state.pending.iter().any(|e| e.job_id == job_id)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn queue() -> (ExecutionQueue, StatusPublisher) {
        let status = StatusPublisher::new();
        (ExecutionQueue::new(status.clone()), status)
    }

    #[tokio::test]
    async fn test_fifo_order_and_coalescing() {
        let (queue, status) = queue();
        let now = Utc::now();

        assert!(queue.push("a", TriggerReason::Scheduled, now).await);
        assert!(queue.push("b", TriggerReason::RunNow, now).await);
        assert!(!queue.push("a", TriggerReason::RunNow, now).await);

        assert_eq!(queue.len().await, 2);
        assert_eq!(status.snapshot().await.queue_size, 2);

        let first = queue.pop().await.unwrap();
        assert_eq!(first.job_id, "a");
        assert_eq!(first.reason, TriggerReason::Scheduled);
        assert_eq!(queue.pop().await.unwrap().job_id, "b");
        assert!(queue.pop().await.is_none());
        assert_eq!(status.snapshot().await.queue_size, 0);
    }

    #[tokio::test]
    async fn test_running_job_is_live_until_finished() {
        let (queue, _) = queue();
        queue.push("a", TriggerReason::RunNow, Utc::now()).await;

        let entry = queue.pop().await.unwrap();
        assert!(queue.is_live("a").await);
        // A running job may be queued once more.
        assert!(queue.push("a", TriggerReason::RunNow, Utc::now()).await);

        queue.finish(&entry.job_id).await;
        assert!(queue.is_live("a").await);
        queue.pop().await;
        queue.finish("a").await;
        assert!(!queue.is_live("a").await);
    }

    #[tokio::test]
    async fn test_remove_drops_pending_entry() {
        let (queue, _) = queue();
        queue.push("a", TriggerReason::Scheduled, Utc::now()).await;
        queue.push("b", TriggerReason::Scheduled, Utc::now()).await;

        assert!(queue.remove("a").await);
        assert!(!queue.remove("a").await);
        assert_eq!(queue.pop().await.unwrap().job_id, "b");
    }

    #[tokio::test]
    async fn test_next_wakes_on_push_and_stops_on_cancel() {
        let (queue, _) = queue();
        let queue = Arc::new(queue);
        let cancel = CancellationToken::new();

        let waiter = {
            let queue = queue.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.next(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push("a", TriggerReason::RunNow, Utc::now()).await;
        let entry = waiter.await.unwrap().unwrap();
        assert_eq!(entry.job_id, "a");

        cancel.cancel();
        assert!(queue.next(&cancel).await.is_none());
    }
}
