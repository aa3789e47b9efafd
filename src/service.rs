//! The daemon's command surface.
//!
//! Every command a client can issue is one async method here. The RPC and
//! WebSocket transports only translate parameters and results; tests drive
//! this type directly. Filesystem work runs on the blocking pool and takes
//! the path locks of the trees it writes.

use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::context::AppContext;
use crate::core::monthly::{self, MonthlyPreview, MonthlyReport};
use crate::core::plugins::{
    self, InstallReport, PluginFolder, ServerDestination, SourcePlugin, ToggleAllReport,
};
use crate::core::{Job, JobDraft, Status, TriggerReason, layout};
use crate::db;
use crate::error::{Error, Result};
use crate::logging;

/// Reply of `run_job_now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunNowReply {
    /// False when the job already had a pending entry.
    pub queued: bool,
}

#[derive(Clone)]
pub struct Service {
    ctx: AppContext,
}

impl Service {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        db::jobs::list(&self.ctx.db).await
    }

    pub async fn add_job(&self, draft: JobDraft) -> Result<Job> {
        let job = db::jobs::add(&self.ctx.db, draft, Utc::now()).await?;
        info!(job_id = %job.id, job = %job.name, "Job added");
        self.ctx.status.job_updated();
        Ok(job)
    }

    pub async fn update_job(&self, draft: JobDraft) -> Result<Job> {
        let job = db::jobs::update(&self.ctx.db, draft, Utc::now()).await?;
        info!(job_id = %job.id, job = %job.name, "Job updated");
        self.ctx.status.job_updated();
        Ok(job)
    }

    /// Remove a job and its pending queue entry. A running backup of the job
    /// finishes normally.
    pub async fn delete_job(&self, id: &str) -> Result<()> {
        db::jobs::delete(&self.ctx.db, id).await?;
        self.ctx.queue.remove(id).await;
        info!(job_id = %id, "Job deleted");
        self.ctx.status.job_updated();
        Ok(())
    }

    pub async fn run_job_now(&self, id: &str) -> Result<RunNowReply> {
        let job = db::jobs::require(&self.ctx.db, id).await?;
        let queued = self
            .ctx
            .queue
            .push(&job.id, TriggerReason::RunNow, Utc::now())
            .await;
        info!(job_id = %job.id, queued, "Run requested");
        Ok(RunNowReply { queued })
    }

    pub async fn get_status(&self) -> Status {
        self.ctx.status.snapshot().await
    }

    pub async fn preview_monthly_archive(&self) -> Result<MonthlyPreview> {
        let jobs = self.list_jobs().await?;
        blocking(move || monthly::preview(&jobs, Utc::now())).await
    }

    pub async fn run_monthly_archive(&self) -> Result<MonthlyReport> {
        let jobs = self.list_jobs().await?;
        let monthly_dir = self.ctx.config.monthly_archive_dir();

        let mut paths: Vec<PathBuf> = jobs
            .iter()
            .map(|j| PathBuf::from(&j.destination_dir))
            .collect();
        paths.push(monthly_dir.clone());
        let _guard = self.ctx.locks.acquire(paths).await;

        let report = blocking(move || monthly::run(&jobs, &monthly_dir, Utc::now())).await?;
        info!(
            archived = report.archived,
            artifacts = report.artifacts.len(),
            errors = report.errors.len(),
            "Monthly archive finished"
        );
        Ok(report)
    }

    pub async fn get_plugin_server_roots(&self) -> Result<Vec<PathBuf>> {
        let jobs = self.list_jobs().await?;
        let install_dir = self.ctx.config.server_roots_dir.clone();
        blocking(move || {
            plugins::server_roots(jobs.iter().map(|j| j.root_dir.as_str()), install_dir.as_deref())
        })
        .await
    }

    pub async fn discover_plugin_destinations(&self) -> Result<Vec<ServerDestination>> {
        let roots = self.get_plugin_server_roots().await?;
        Ok(plugins::discover_destinations(&roots))
    }

    pub async fn list_source_plugins(&self, source: PathBuf) -> Result<Vec<SourcePlugin>> {
        blocking(move || plugins::list_source_plugins(&source)).await
    }

    pub async fn install_plugins(
        &self,
        sources: Vec<PathBuf>,
        destinations: Vec<PathBuf>,
    ) -> Result<InstallReport> {
        if sources.is_empty() || destinations.is_empty() {
            return Err(Error::Validation(
                "at least one source and one destination are required".to_string(),
            ));
        }

        let _guard = self.ctx.locks.acquire(destinations.iter()).await;
        blocking(move || Ok(plugins::install(&sources, &destinations))).await
    }

    pub async fn list_plugin_folders(&self, server_root: PathBuf) -> Result<Vec<PluginFolder>> {
        blocking(move || plugins::list_plugin_folders(&server_root)).await
    }

    pub async fn toggle_plugin_folder(&self, folder: PathBuf) -> Result<PathBuf> {
        // The rename touches both names, so lock the directory holding them.
        let parent = folder.parent().map(PathBuf::from).unwrap_or_else(|| folder.clone());
        let _guard = self.ctx.locks.acquire([parent]).await;
        blocking(move || plugins::toggle_single(&folder)).await
    }

    pub async fn toggle_plugin_for_all_servers(
        &self,
        base_folder_name: String,
        target_state_disabled: bool,
    ) -> Result<ToggleAllReport> {
        if base_folder_name.trim().is_empty() {
            return Err(Error::Validation("base_folder_name is required".to_string()));
        }

        let roots = self.get_plugin_server_roots().await?;
        let _guard = self
            .ctx
            .locks
            .acquire(roots.iter().map(|r| layout::plugins_dir(r)))
            .await;

        let report = blocking(move || {
            Ok(plugins::toggle_all(&roots, &base_folder_name, target_state_disabled))
        })
        .await?;
        info!(
            toggled = report.toggled.len(),
            errors = report.errors.len(),
            "Toggled plugin on all servers"
        );
        Ok(report)
    }

    pub async fn read_logs(&self, lines: Option<usize>) -> Result<String> {
        let log_dir = self.ctx.config.log_dir();
        let lines = lines.unwrap_or(logging::DEFAULT_TAIL_LINES);
        blocking(move || logging::read_logs(&log_dir, lines)).await
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}
