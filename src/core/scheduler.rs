//! Periodic evaluation of due jobs.
//!
//! The scheduler only enqueues; it never waits on a backup.

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::models::TriggerReason;
use super::schedule;
use crate::context::AppContext;
use crate::db;
use crate::error::Result;

/// Evaluate every job once. Returns the number of entries enqueued.
///
/// An enabled job whose `next_run_at` has passed and which is neither queued
/// nor running gets one queue entry, and its `next_run_at` moves forward by
/// whole intervals until it lies after `now`: missed intervals collapse
/// into a single run.
pub async fn tick(ctx: &AppContext, now: DateTime<Utc>) -> Result<usize> {
    let jobs = db::jobs::list(&ctx.db).await?;
    let mut enqueued = 0;
    let mut store_changed = false;

    for job in jobs.iter().filter(|j| j.enabled) {
        let Some(next) = job.next_run_at else {
            db::jobs::set_next_run(&ctx.db, &job.id, job.first_run_after(now)).await?;
            store_changed = true;
            continue;
        };

        if next > now || ctx.queue.is_live(&job.id).await {
            continue;
        }

        ctx.queue.push(&job.id, TriggerReason::Scheduled, now).await;
        let advanced = schedule::advance_past(next, job.interval(), now);
        db::jobs::set_next_run(&ctx.db, &job.id, advanced).await?;
        debug!(job_id = %job.id, next_run_at = %advanced, "Scheduled job enqueued");

        enqueued += 1;
        store_changed = true;
    }

    ctx.status.record_tick(now).await;
    if store_changed {
        ctx.status.job_updated();
    }
    Ok(enqueued)
}

/// Tick on the configured cadence until `cancel` fires.
pub async fn run(ctx: AppContext, cancel: CancellationToken) {
    let period = ctx.config.tick_interval();
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    ctx.status.set_running(true).await;
    info!(tick_secs = period.as_secs(), "Scheduler started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = tick(&ctx, Utc::now()).await {
                    error!(error = %e, "Scheduler tick failed");
                }
            }
        }
    }

    ctx.status.set_running(false).await;
    info!("Scheduler stopped");
}
