use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{layout, schedule};
use crate::error::{Error, Result};

/// Recurrence unit of a job's interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Minutes,
    Hours,
    Days,
}

impl IntervalUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::Days => "days",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "minutes" => Some(Self::Minutes),
            "hours" => Some(Self::Hours),
            "days" => Some(Self::Days),
            _ => None,
        }
    }
}

/// A named, schedulable backup definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub root_dir: String,
    pub destination_dir: String,
    pub map: String,
    pub include_saves: bool,
    pub include_map: bool,
    pub include_server_files: bool,
    pub include_plugin_configs: bool,
    pub interval_value: u32,
    pub interval_unit: IntervalUnit,
    pub retention_days: u32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_file_size: Option<u64>,
    /// Present when the last run failed.
    pub last_error: Option<String>,
}

/// The user-editable part of a job, as sent by `add_job` / `update_job`.
///
/// `id` is ignored on add and required on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDraft {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub root_dir: String,
    pub destination_dir: String,
    pub map: String,
    #[serde(default)]
    pub include_saves: bool,
    #[serde(default)]
    pub include_map: bool,
    #[serde(default)]
    pub include_server_files: bool,
    #[serde(default)]
    pub include_plugin_configs: bool,
    pub interval_value: u32,
    pub interval_unit: IntervalUnit,
    #[serde(default)]
    pub retention_days: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl JobDraft {
    /// Check required fields. Does not touch the filesystem.
    pub fn validate_fields(&self) -> Result<()> {
        let required = [
            ("name", &self.name),
            ("root_dir", &self.root_dir),
            ("destination_dir", &self.destination_dir),
            ("map", &self.map),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Validation(format!("{} is required", field)));
            }
        }
        if self.interval_value == 0 {
            return Err(Error::Validation(
                "interval_value must be greater than 0".to_string(),
            ));
        }
        let max = Duration::days(schedule::MAX_INTERVAL_DAYS);
        if schedule::interval(self.interval_value, self.interval_unit) > max {
            return Err(Error::Validation(format!(
                "interval must not exceed {} days",
                schedule::MAX_INTERVAL_DAYS
            )));
        }
        Ok(())
    }

    /// Full validation: required fields, an existing root directory, and the
    /// server directories each include flag reads from.
    pub fn validate(&self) -> Result<()> {
        self.validate_fields()?;

        let root = Path::new(&self.root_dir);
        if !root.is_dir() {
            return Err(Error::Validation(format!(
                "Server root directory does not exist: {}",
                self.root_dir
            )));
        }

        if self.include_saves || self.include_map {
            let saves = layout::saves_dir(root, &self.map);
            if !saves.is_dir() {
                return Err(Error::Validation(format!(
                    "Saves directory does not exist: {}",
                    saves.display()
                )));
            }
        }

        if self.include_server_files {
            let config = layout::config_dir(root);
            if !config.is_dir() {
                return Err(Error::Validation(format!(
                    "Server config directory does not exist: {}",
                    config.display()
                )));
            }
            for file in layout::SERVER_FILES {
                if !config.join(file).is_file() {
                    return Err(Error::Validation(format!(
                        "{} not found in: {}",
                        file,
                        config.display()
                    )));
                }
            }
        }

        if self.include_plugin_configs {
            let plugins = layout::plugins_dir(root);
            if !plugins.is_dir() {
                return Err(Error::Validation(format!(
                    "Plugins directory does not exist: {}",
                    plugins.display()
                )));
            }
        }

        Ok(())
    }
}

impl Job {
    /// Create a new job from a draft, assigning a fresh id.
    pub fn create(draft: JobDraft, now: DateTime<Utc>) -> Self {
        let mut job = Self {
            id: uuid::Uuid::now_v7().to_string(),
            name: draft.name,
            root_dir: draft.root_dir,
            destination_dir: draft.destination_dir,
            map: draft.map,
            include_saves: draft.include_saves,
            include_map: draft.include_map,
            include_server_files: draft.include_server_files,
            include_plugin_configs: draft.include_plugin_configs,
            interval_value: draft.interval_value,
            interval_unit: draft.interval_unit,
            retention_days: draft.retention_days,
            enabled: draft.enabled,
            created_at: now,
            next_run_at: None,
            last_run_at: None,
            last_file_size: None,
            last_error: None,
        };
        job.next_run_at = Some(job.first_run_after(now));
        job
    }

    /// Apply an edit. Identity, creation time and run history are kept; the
    /// next run is recomputed from the (possibly new) interval.
    pub fn apply(&mut self, draft: JobDraft, now: DateTime<Utc>) {
        self.name = draft.name;
        self.root_dir = draft.root_dir;
        self.destination_dir = draft.destination_dir;
        self.map = draft.map;
        self.include_saves = draft.include_saves;
        self.include_map = draft.include_map;
        self.include_server_files = draft.include_server_files;
        self.include_plugin_configs = draft.include_plugin_configs;
        self.interval_value = draft.interval_value;
        self.interval_unit = draft.interval_unit;
        self.retention_days = draft.retention_days;
        self.enabled = draft.enabled;
        self.next_run_at = Some(self.first_run_after(now));
    }

    pub fn interval(&self) -> Duration {
        schedule::interval(self.interval_value, self.interval_unit)
    }

    /// `last_run_at` (or creation time) plus one interval, advanced past `now`.
    pub fn first_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let anchor = self.last_run_at.unwrap_or(self.created_at);
        schedule::advance_past(anchor, self.interval(), now)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_run_at.is_some_and(|at| at <= now)
    }
}

/// Why a queue entry exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    Scheduled,
    RunNow,
}

/// A job id awaiting execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    pub job_id: String,
    pub reason: TriggerReason,
    pub enqueued_at: DateTime<Utc>,
}

/// The job currently executing on the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentJob {
    pub id: String,
    pub name: String,
}

/// Scheduler/worker snapshot exposed by `get_status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub running: bool,
    pub queue_size: usize,
    pub current_job: Option<CurrentJob>,
    pub last_tick: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn draft(name: &str) -> JobDraft {
        JobDraft {
            id: None,
            name: name.to_string(),
            root_dir: "/srv/ark/island".to_string(),
            destination_dir: "/backups/island".to_string(),
            map: "TheIsland".to_string(),
            include_saves: true,
            include_map: true,
            include_server_files: false,
            include_plugin_configs: false,
            interval_value: 30,
            interval_unit: IntervalUnit::Minutes,
            retention_days: 7,
            enabled: true,
        }
    }

    #[test]
    fn test_create_sets_next_run_one_interval_out() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let job = Job::create(draft("island"), now);

        assert_eq!(job.next_run_at, Some(now + Duration::minutes(30)));
        assert!(job.last_run_at.is_none());
        assert!(!job.id.is_empty());
    }

    #[test]
    fn test_apply_keeps_identity_and_history() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut job = Job::create(draft("island"), now);
        let id = job.id.clone();
        job.last_run_at = Some(now + Duration::minutes(30));
        job.last_file_size = Some(42);

        let mut edit = draft("island-renamed");
        edit.interval_value = 2;
        edit.interval_unit = IntervalUnit::Hours;
        job.apply(edit, now + Duration::minutes(31));

        assert_eq!(job.id, id);
        assert_eq!(job.name, "island-renamed");
        assert_eq!(job.last_file_size, Some(42));
        assert_eq!(
            job.next_run_at,
            Some(now + Duration::minutes(30) + Duration::hours(2))
        );
    }

    #[test]
    fn test_validate_fields_rejects_missing_values() {
        let mut d = draft("x");
        d.map = "  ".to_string();
        assert!(matches!(d.validate_fields(), Err(Error::Validation(_))));

        let mut d = draft("x");
        d.interval_value = 0;
        assert!(matches!(d.validate_fields(), Err(Error::Validation(_))));

        assert!(draft("x").validate_fields().is_ok());
    }

    #[test]
    fn test_validate_requires_existing_root() {
        let mut d = draft("x");
        d.root_dir = "/definitely/not/here".to_string();
        assert!(matches!(d.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_validate_fields_rejects_huge_interval() {
        let mut d = draft("x");
        d.interval_value = 4_000_000_000;
        d.interval_unit = IntervalUnit::Hours;
        assert!(matches!(d.validate_fields(), Err(Error::Validation(_))));

        d.interval_value = schedule::MAX_INTERVAL_DAYS as u32;
        d.interval_unit = IntervalUnit::Days;
        assert!(d.validate_fields().is_ok());

        d.interval_value += 1;
        assert!(matches!(d.validate_fields(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_validate_checks_directories_for_include_flags() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        let mut d = draft("x");
        d.root_dir = root.display().to_string();

        // Saves dir missing for the selected map.
        let err = d.validate().unwrap_err();
        assert!(err.to_string().contains("Saves directory"));

        std::fs::create_dir_all(layout::saves_dir(root, "TheIsland")).unwrap();
        assert!(d.validate().is_ok());

        d.map = "Ragnarok".to_string();
        assert!(matches!(d.validate(), Err(Error::Validation(_))));
        d.map = "TheIsland".to_string();

        d.include_server_files = true;
        let config = layout::config_dir(root);
        std::fs::create_dir_all(&config).unwrap();
        std::fs::write(config.join("GameUserSettings.ini"), b"").unwrap();
        let err = d.validate().unwrap_err();
        assert!(err.to_string().contains("Game.ini"));
        std::fs::write(config.join("Game.ini"), b"").unwrap();
        assert!(d.validate().is_ok());

        d.include_plugin_configs = true;
        let err = d.validate().unwrap_err();
        assert!(err.to_string().contains("Plugins directory"));
        std::fs::create_dir_all(layout::plugins_dir(root)).unwrap();
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_disabled_job_is_never_due() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut job = Job::create(draft("island"), now);
        let later = now + Duration::hours(1);
        assert!(job.is_due(later));

        job.enabled = false;
        assert!(!job.is_due(later));
        assert!(job.next_run_at.is_some());
    }

    #[test]
    fn test_interval_unit_serde_is_lowercase() {
        let json = serde_json::to_string(&IntervalUnit::Hours).unwrap();
        assert_eq!(json, "\"hours\"");
        assert_eq!(IntervalUnit::parse("days"), Some(IntervalUnit::Days));
        assert_eq!(IntervalUnit::parse("weeks"), None);
    }
}
