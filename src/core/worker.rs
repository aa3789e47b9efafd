//! The single backup worker.
//!
//! Exactly one job executes at a time. Each dequeued job is archived, its
//! bookkeeping stored, and its old archives pruned. A failed run is recorded
//! as `last_error` and never stops the loop.

use std::path::PathBuf;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::archive::{self, ArchiveOutcome};
use super::models::{CurrentJob, Job, QueueEntry};
use super::retention;
use crate::context::AppContext;
use crate::db;
use crate::error::{Error, Result};

/// What happened to one dequeued entry.
#[derive(Debug)]
pub enum RunResult {
    /// The job was deleted after it was queued.
    Skipped,
    Succeeded(ArchiveOutcome),
    Failed(String),
}

/// Consume the queue until `cancel` fires. A run in progress is allowed to
/// finish.
pub async fn run(ctx: AppContext, cancel: CancellationToken) {
    info!("Backup worker started");

    while let Some(entry) = ctx.queue.next(&cancel).await {
        let job_id = entry.job_id.clone();
        match execute(&ctx, &entry).await {
            Ok(RunResult::Skipped) => debug!(job_id = %job_id, "Queued job no longer exists"),
            Ok(_) => {}
            Err(e) => error!(job_id = %job_id, error = %e, "Failed to execute queued job"),
        }
        ctx.queue.finish(&job_id).await;

        if cancel.is_cancelled() {
            break;
        }
    }

    info!("Backup worker stopped");
}

/// Run one queue entry to completion.
///
/// Backup failures are stored on the job and returned as
/// [`RunResult::Failed`]; an `Err` means the job store itself failed.
pub async fn execute(ctx: &AppContext, entry: &QueueEntry) -> Result<RunResult> {
    let Some(job) = db::jobs::get(&ctx.db, &entry.job_id).await? else {
        return Ok(RunResult::Skipped);
    };

    info!(job_id = %job.id, job = %job.name, reason = ?entry.reason, "Starting backup");
    ctx.status
        .set_current_job(Some(CurrentJob {
            id: job.id.clone(),
            name: job.name.clone(),
        }))
        .await;

    let result = backup(ctx, &job).await;
    ctx.status.set_current_job(None).await;
    ctx.status.job_updated();
    result
}

async fn backup(ctx: &AppContext, job: &Job) -> Result<RunResult> {
    let _guard = ctx
        .locks
        .acquire([
            PathBuf::from(&job.root_dir),
            PathBuf::from(&job.destination_dir),
        ])
        .await;

    let started = Utc::now();
    let archived = {
        let job = job.clone();
        tokio::task::spawn_blocking(move || archive::create_archive(&job, started))
            .await
            .map_err(Error::from)
            .and_then(|r| r)
    };

    let outcome = match archived {
        Ok(outcome) => outcome,
        Err(e) => {
            let message = e.to_string();
            warn!(job_id = %job.id, error = %message, "Backup failed");
            db::jobs::record_failure(&ctx.db, &job.id, message.clone()).await?;
            return Ok(RunResult::Failed(message));
        }
    };

    let finished = Utc::now();
    info!(
        job_id = %job.id,
        archive = %outcome.path.display(),
        size = outcome.size,
        entries = outcome.entries,
        skipped = outcome.skipped,
        "Backup complete"
    );

    if !db::jobs::record_success(&ctx.db, &job.id, finished, outcome.size).await? {
        debug!(job_id = %job.id, "Job deleted during backup");
        return Ok(RunResult::Succeeded(outcome));
    }

    let dest = PathBuf::from(&job.destination_dir);
    let name = job.name.clone();
    let retention_days = job.retention_days;
    let pruned = tokio::task::spawn_blocking(move || {
        retention::prune(&dest, &name, retention_days, finished)
    })
    .await;

    match pruned {
        Ok(Ok(report)) if !report.deleted.is_empty() || !report.errors.is_empty() => info!(
            job_id = %job.id,
            deleted = report.deleted.len(),
            failed = report.errors.len(),
            "Retention pruning finished"
        ),
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!(job_id = %job.id, error = %e, "Retention pruning failed"),
        Err(e) => warn!(job_id = %job.id, error = %e, "Retention task failed"),
    }

    Ok(RunResult::Succeeded(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::core::layout;
    use crate::core::models::{IntervalUnit, JobDraft, TriggerReason};
    use std::fs;
    use tempfile::tempdir;

    async fn context() -> AppContext {
        let db = db::init_in_memory().await.unwrap();
        AppContext::new(AppConfig::default(), db)
    }

    fn draft(root: &std::path::Path, dest: &std::path::Path) -> JobDraft {
        JobDraft {
            id: None,
            name: "Island".to_string(),
            root_dir: root.display().to_string(),
            destination_dir: dest.display().to_string(),
            map: "TheIsland".to_string(),
            include_saves: true,
            include_map: true,
            include_server_files: false,
            include_plugin_configs: false,
            interval_value: 1,
            interval_unit: IntervalUnit::Hours,
            retention_days: 7,
            enabled: true,
        }
    }

    fn entry(job_id: &str) -> QueueEntry {
        QueueEntry {
            job_id: job_id.to_string(),
            reason: TriggerReason::RunNow,
            enqueued_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_successful_run_updates_job() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("server");
        let saves = layout::saves_dir(&root, "TheIsland");
        fs::create_dir_all(&saves).unwrap();
        fs::write(saves.join("TheIsland_WP.ark"), b"world").unwrap();
        let dest = temp.path().join("backups");

        let ctx = context().await;
        let job = db::jobs::add(&ctx.db, draft(&root, &dest), Utc::now())
            .await
            .unwrap();

        let result = execute(&ctx, &entry(&job.id)).await.unwrap();
        let RunResult::Succeeded(outcome) = result else {
            panic!("Expected success, got {:?}", result);
        };
        assert!(outcome.path.exists());

        let stored = db::jobs::require(&ctx.db, &job.id).await.unwrap();
        let last_run = stored.last_run_at.unwrap();
        assert_eq!(stored.last_file_size, Some(outcome.size));
        assert!(stored.last_error.is_none());
        assert_eq!(stored.next_run_at, Some(last_run + chrono::Duration::hours(1)));
        assert!(ctx.status.snapshot().await.current_job.is_none());
    }

    #[tokio::test]
    async fn test_failed_run_records_error_only() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("server");
        fs::create_dir_all(layout::saves_dir(&root, "TheIsland")).unwrap();

        let ctx = context().await;
        let job = db::jobs::add(&ctx.db, draft(&root, &temp.path().join("b")), Utc::now())
            .await
            .unwrap();
        fs::remove_dir_all(&root).unwrap();

        let result = execute(&ctx, &entry(&job.id)).await.unwrap();
        assert!(matches!(result, RunResult::Failed(_)));

        let stored = db::jobs::require(&ctx.db, &job.id).await.unwrap();
        assert!(stored.last_error.unwrap().contains("does not exist"));
        assert!(stored.last_run_at.is_none());
        assert_eq!(stored.next_run_at, job.next_run_at);
    }

    #[tokio::test]
    async fn test_deleted_job_is_skipped() {
        let ctx = context().await;
        let result = execute(&ctx, &entry("gone")).await.unwrap();
        assert!(matches!(result, RunResult::Skipped));
    }
}
