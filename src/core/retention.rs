//! Retention pruning of a job's archives.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::archive::list_job_archives;
use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    pub deleted: Vec<PathBuf>,
    pub errors: Vec<String>,
}

/// Delete every archive of `job_name` in `dir` created before
/// `now - retention_days`. The newest archive is always kept.
///
/// A failed deletion is logged and reported; the remaining files are still
/// processed.
pub fn prune(
    dir: &Path,
    job_name: &str,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<PruneReport> {
    let cutoff = now - Duration::days(i64::from(retention_days));
    let archives = list_job_archives(dir, job_name)?;
    let mut report = PruneReport::default();

    // Newest first: skip(1) protects the archive that was just produced.
    for archive in archives.into_iter().skip(1) {
        if archive.created_at >= cutoff {
            continue;
        }
        match fs::remove_file(&archive.path) {
            Ok(()) => {
                info!(path = %archive.path.display(), "Pruned old backup");
                report.deleted.push(archive.path);
            }
            Err(e) => {
                warn!(path = %archive.path.display(), error = %e, "Failed to prune backup");
                report
                    .errors
                    .push(format!("{}: {}", archive.path.display(), e));
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::archive::archive_file_name;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap() + Duration::days(n)
    }

    fn touch(dir: &Path, at: DateTime<Utc>) -> PathBuf {
        let path = dir.join(archive_file_name("Island", at));
        fs::write(&path, b"zip").unwrap();
        path
    }

    #[test]
    fn test_prune_keeps_archives_inside_window() {
        let temp = tempdir().unwrap();
        let d0 = touch(temp.path(), day(0));
        let d3 = touch(temp.path(), day(3));
        let d6 = touch(temp.path(), day(6));
        let d10 = touch(temp.path(), day(10));

        let report = prune(temp.path(), "Island", 7, day(10)).unwrap();

        assert_eq!(report.deleted, vec![d0.clone()]);
        assert!(report.errors.is_empty());
        assert!(!d0.exists());
        assert!(d3.exists() && d6.exists() && d10.exists());
    }

    #[test]
    fn test_zero_retention_keeps_only_newest() {
        let temp = tempdir().unwrap();
        let old = touch(temp.path(), day(0));
        let older = touch(temp.path(), day(-1));
        let newest = touch(temp.path(), day(1));

        let report = prune(temp.path(), "Island", 0, day(1)).unwrap();

        assert_eq!(report.deleted.len(), 2);
        assert!(!old.exists() && !older.exists());
        assert!(newest.exists());
    }

    #[test]
    fn test_prune_ignores_other_jobs_files() {
        let temp = tempdir().unwrap();
        let other = temp.path().join(archive_file_name("Ragnarok", day(0)));
        fs::write(&other, b"zip").unwrap();
        touch(temp.path(), day(10));

        prune(temp.path(), "Island", 1, day(10)).unwrap();
        assert!(other.exists());
    }

    #[test]
    fn test_prune_missing_dir_is_empty() {
        let temp = tempdir().unwrap();
        let report = prune(&temp.path().join("absent"), "Island", 7, day(0)).unwrap();
        assert!(report.deleted.is_empty());
    }
}
