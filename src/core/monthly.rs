//! Monthly consolidation of backup archives.
//!
//! For every job, the two oldest archives of the current UTC calendar month
//! are moved into `<monthly dir>/<YYYY-MM>/<job>_<YYYY-MM>.zip`. Each backup is
//! stored as an entry under its own file name; an existing monthly artifact
//! keeps its earlier entries.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::archive::{self, ArchiveFile};
use super::models::Job;
use crate::error::{Error, Result};

/// Archives taken from each job per consolidation.
pub const ARCHIVES_PER_JOB: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonthlyPreview {
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MonthlyReport {
    /// Number of backups moved into monthly artifacts.
    pub archived: usize,
    /// Root directory of the monthly artifacts.
    pub destination: PathBuf,
    pub artifacts: Vec<PathBuf>,
    pub errors: Vec<String>,
}

/// Backups of one job picked for consolidation.
#[derive(Debug, Clone)]
pub struct Selection {
    pub job_name: String,
    pub archives: Vec<ArchiveFile>,
}

pub fn month_key(now: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", now.year(), now.month())
}

/// Pick the oldest archives of the current month for every job. Jobs with
/// fewer than [`ARCHIVES_PER_JOB`] qualifying archives are left out.
pub fn select(jobs: &[Job], now: DateTime<Utc>) -> Result<Vec<Selection>> {
    let mut seen = HashSet::new();
    let mut selections = Vec::new();

    for job in jobs {
        // Two jobs writing the same archives must not select them twice.
        let key = (
            PathBuf::from(&job.destination_dir),
            archive::sanitize_name(&job.name),
        );
        if !seen.insert(key) {
            continue;
        }

        let mut this_month: Vec<ArchiveFile> =
            archive::list_job_archives(Path::new(&job.destination_dir), &job.name)?
                .into_iter()
                .filter(|a| a.created_at.year() == now.year() && a.created_at.month() == now.month())
                .collect();

        if this_month.len() < ARCHIVES_PER_JOB {
            continue;
        }

        this_month.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.path.cmp(&b.path)));
        this_month.truncate(ARCHIVES_PER_JOB);

        selections.push(Selection {
            job_name: job.name.clone(),
            archives: this_month,
        });
    }

    Ok(selections)
}

/// Dry run: the files [`run`] would consolidate right now.
pub fn preview(jobs: &[Job], now: DateTime<Utc>) -> Result<MonthlyPreview> {
    let files = select(jobs, now)?
        .into_iter()
        .flat_map(|s| s.archives.into_iter().map(|a| a.path))
        .collect();
    Ok(MonthlyPreview { files })
}

/// Consolidate the current selection into `monthly_dir`.
///
/// Originals are removed only after the artifact containing them has been
/// renamed into place. A failure for one job is reported and the remaining
/// jobs are still processed.
pub fn run(jobs: &[Job], monthly_dir: &Path, now: DateTime<Utc>) -> Result<MonthlyReport> {
    let selections = select(jobs, now)?;
    let mut report = MonthlyReport {
        destination: monthly_dir.to_path_buf(),
        ..Default::default()
    };

    if selections.is_empty() {
        info!("No backups qualify for monthly consolidation");
        return Ok(report);
    }

    let month = month_key(now);
    let month_dir = monthly_dir.join(&month);
    fs::create_dir_all(&month_dir).map_err(|e| Error::io_at("create", &month_dir, e))?;

    for selection in selections {
        let artifact = month_dir.join(format!(
            "{}_{}.zip",
            archive::sanitize_name(&selection.job_name),
            month
        ));

        if let Err(e) = write_artifact(&artifact, &selection.archives) {
            warn!(job = %selection.job_name, error = %e, "Monthly consolidation failed");
            report.errors.push(format!("{}: {}", selection.job_name, e));
            continue;
        }

        for original in &selection.archives {
            match fs::remove_file(&original.path) {
                Ok(()) => info!(
                    from = %original.path.display(),
                    to = %artifact.display(),
                    "Archived backup into monthly artifact"
                ),
                Err(e) => {
                    warn!(path = %original.path.display(), error = %e, "Failed to remove archived backup");
                    report
                        .errors
                        .push(format!("{}: {}", original.path.display(), e));
                }
            }
            report.archived += 1;
        }
        report.artifacts.push(artifact);
    }

    Ok(report)
}

/// Write `artifact` with the existing entries (if any) plus `archives`.
fn write_artifact(artifact: &Path, archives: &[ArchiveFile]) -> Result<()> {
    let temp_path = artifact.with_extension("zip.tmp");

    let result = build_artifact(artifact, &temp_path, archives).and_then(|()| {
        fs::rename(&temp_path, artifact).map_err(|e| Error::io_at("move artifact into", artifact, e))
    });

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn build_artifact(artifact: &Path, temp_path: &Path, archives: &[ArchiveFile]) -> Result<()> {
    let entry_names: Vec<String> = archives
        .iter()
        .map(|a| entry_name(&a.path))
        .collect::<Result<_>>()?;

    let file = File::create(temp_path).map_err(|e| Error::io_at("create", temp_path, e))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));

    if artifact.is_file() {
        let existing = File::open(artifact).map_err(|e| Error::io_at("open", artifact, e))?;
        let mut existing = ZipArchive::new(existing)?;
        for i in 0..existing.len() {
            let entry = existing.by_index_raw(i)?;
            // A re-added backup replaces its older copy.
            if entry_names.iter().any(|n| n == entry.name()) {
                continue;
            }
            zip.raw_copy_file(entry)?;
        }
    }

    // Backups are already compressed.
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .large_file(true);

    for (source, name) in archives.iter().zip(entry_names) {
        let mut input =
            File::open(&source.path).map_err(|e| Error::io_at("open", &source.path, e))?;
        zip.start_file(name, options)?;
        io::copy(&mut input, &mut zip)
            .map_err(|e| Error::io_at("copy into artifact", &source.path, e))?;
    }

    let writer = zip.finish()?;
    let file = writer
        .into_inner()
        .map_err(|e| Error::io("Failed to flush monthly artifact", e.into_error()))?;
    file.sync_all()
        .map_err(|e| Error::io_at("sync", temp_path, e))?;
    Ok(())
}

fn entry_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::Archive(format!("Invalid backup file name: {}", path.display())))
}
