//! Job Store: durable registry of jobs.
//!
//! Every call is one statement or one transaction on the connection thread, so
//! readers never observe a half-applied update.

use chrono::{DateTime, Utc};
use tokio_rusqlite::rusqlite::OptionalExtension;
use tokio_rusqlite::{Connection, params, rusqlite};

use crate::core::archive::sanitize_name;
use crate::core::models::{IntervalUnit, Job, JobDraft};
use crate::error::{Error, Result};

const SELECT_JOB: &str = "SELECT id, name, root_dir, destination_dir, map,
        include_saves, include_map, include_server_files, include_plugin_configs,
        interval_value, interval_unit, retention_days, enabled,
        created_at, next_run_at, last_run_at, last_file_size, last_error
     FROM jobs";

fn db_err(e: impl std::fmt::Display) -> Error {
    Error::Database(e.to_string())
}

fn parse_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
    })
    .transpose()
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let unit: String = row.get(10)?;
    let interval_unit = IntervalUnit::parse(&unit).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            10,
            rusqlite::types::Type::Text,
            format!("unknown interval unit '{}'", unit).into(),
        )
    })?;
    let created_at = parse_ts(13, Some(row.get(13)?))?.unwrap_or_else(Utc::now);

    Ok(Job {
        id: row.get(0)?,
        name: row.get(1)?,
        root_dir: row.get(2)?,
        destination_dir: row.get(3)?,
        map: row.get(4)?,
        include_saves: row.get(5)?,
        include_map: row.get(6)?,
        include_server_files: row.get(7)?,
        include_plugin_configs: row.get(8)?,
        interval_value: row.get(9)?,
        interval_unit,
        retention_days: row.get(11)?,
        enabled: row.get(12)?,
        created_at,
        next_run_at: parse_ts(14, row.get(14)?)?,
        last_run_at: parse_ts(15, row.get(15)?)?,
        last_file_size: row.get::<_, Option<i64>>(16)?.map(|v| v.max(0) as u64),
        last_error: row.get(17)?,
    })
}

fn ts(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(|d| d.to_rfc3339())
}

fn write_job(c: &rusqlite::Connection, job: &Job, upsert: bool) -> rusqlite::Result<usize> {
    let sql = if upsert {
        "INSERT INTO jobs (id, name, root_dir, destination_dir, map,
            include_saves, include_map, include_server_files, include_plugin_configs,
            interval_value, interval_unit, retention_days, enabled,
            created_at, next_run_at, last_run_at, last_file_size, last_error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
    } else {
        "UPDATE jobs SET name = ?2, root_dir = ?3, destination_dir = ?4, map = ?5,
            include_saves = ?6, include_map = ?7, include_server_files = ?8,
            include_plugin_configs = ?9, interval_value = ?10, interval_unit = ?11,
            retention_days = ?12, enabled = ?13, created_at = ?14, next_run_at = ?15,
            last_run_at = ?16, last_file_size = ?17, last_error = ?18
         WHERE id = ?1"
    };

    c.execute(
        sql,
        params![
            &job.id,
            &job.name,
            &job.root_dir,
            &job.destination_dir,
            &job.map,
            job.include_saves,
            job.include_map,
            job.include_server_files,
            job.include_plugin_configs,
            job.interval_value,
            job.interval_unit.as_str(),
            job.retention_days,
            job.enabled,
            job.created_at.to_rfc3339(),
            ts(job.next_run_at),
            ts(job.last_run_at),
            job.last_file_size.map(|v| v as i64),
            &job.last_error,
        ],
    )
}

/// Validate and persist a new job. Returns the stored job with its id.
pub async fn add(conn: &Connection, draft: JobDraft, now: DateTime<Utc>) -> Result<Job> {
    draft.validate()?;
    ensure_unique_archives(conn, &draft, None).await?;
    let job = Job::create(draft, now);

    let stored = job.clone();
    conn.call(move |c| write_job(c, &stored, true))
        .await
        .map_err(db_err)?;

    Ok(job)
}

/// Archives are identified by sanitized job name within a destination, so two
/// jobs sharing both would overwrite and prune each other's backups.
async fn ensure_unique_archives(
    conn: &Connection,
    draft: &JobDraft,
    exclude_id: Option<&str>,
) -> Result<()> {
    let name = sanitize_name(&draft.name);
    let destination = std::path::Path::new(&draft.destination_dir);

    let clash = list(conn).await?.into_iter().find(|job| {
        Some(job.id.as_str()) != exclude_id
            && sanitize_name(&job.name) == name
            && std::path::Path::new(&job.destination_dir) == destination
    });

    match clash {
        Some(job) => Err(Error::Validation(format!(
            "Job '{}' already writes archives named '{}' to {}",
            job.name, name, draft.destination_dir
        ))),
        None => Ok(()),
    }
}

pub async fn get(conn: &Connection, id: &str) -> Result<Option<Job>> {
    let id = id.to_string();
    conn.call(move |c| {
        c.query_row(&format!("{} WHERE id = ?1", SELECT_JOB), params![id], row_to_job)
            .optional()
    })
    .await
    .map_err(db_err)
}

/// Like [`get`] but an unknown id is `NotFound`.
pub async fn require(conn: &Connection, id: &str) -> Result<Job> {
    get(conn, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("job {}", id)))
}

pub async fn list(conn: &Connection) -> Result<Vec<Job>> {
    conn.call(|c| {
        let mut stmt = c.prepare(&format!("{} ORDER BY created_at, name", SELECT_JOB))?;
        let jobs = stmt
            .query_map([], row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok::<_, rusqlite::Error>(jobs)
    })
    .await
    .map_err(db_err)
}

/// Apply an edit to an existing job. The read-modify-write happens in one
/// transaction so concurrent run bookkeeping is not lost.
pub async fn update(conn: &Connection, draft: JobDraft, now: DateTime<Utc>) -> Result<Job> {
    draft.validate()?;
    let id = draft
        .id
        .clone()
        .ok_or_else(|| Error::Validation("id is required for update".to_string()))?;
    ensure_unique_archives(conn, &draft, Some(&id)).await?;

    let lookup = id.clone();
    let updated = conn
        .call(move |c| {
            let tx = c.transaction()?;
            let current = tx
                .query_row(
                    &format!("{} WHERE id = ?1", SELECT_JOB),
                    params![lookup],
                    row_to_job,
                )
                .optional()?;

            let Some(mut job) = current else {
                return Ok(None);
            };
            job.apply(draft, now);
            write_job(&tx, &job, false)?;
            tx.commit()?;
            Ok::<_, rusqlite::Error>(Some(job))
        })
        .await
        .map_err(db_err)?;

    updated.ok_or_else(|| Error::NotFound(format!("job {}", id)))
}

/// Remove a job. Unknown ids are `NotFound`.
pub async fn delete(conn: &Connection, id: &str) -> Result<()> {
    let key = id.to_string();
    let removed = conn
        .call(move |c| c.execute("DELETE FROM jobs WHERE id = ?1", params![key]))
        .await
        .map_err(db_err)?;

    if removed == 0 {
        return Err(Error::NotFound(format!("job {}", id)));
    }
    Ok(())
}

/// Store a new `next_run_at` without touching anything else.
pub async fn set_next_run(conn: &Connection, id: &str, next: DateTime<Utc>) -> Result<()> {
    let id = id.to_string();
    conn.call(move |c| {
        c.execute(
            "UPDATE jobs SET next_run_at = ?2 WHERE id = ?1",
            params![id, next.to_rfc3339()],
        )
    })
    .await
    .map_err(db_err)?;
    Ok(())
}

/// Bookkeeping after a successful run. Returns false if the job is gone.
pub async fn record_success(
    conn: &Connection,
    id: &str,
    finished_at: DateTime<Utc>,
    file_size: u64,
) -> Result<bool> {
    let id = id.to_string();
    conn.call(move |c| {
        let tx = c.transaction()?;
        let current = tx
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_JOB),
                params![id],
                row_to_job,
            )
            .optional()?;

        let Some(mut job) = current else {
            return Ok(false);
        };
        job.last_run_at = Some(finished_at);
        job.last_file_size = Some(file_size);
        job.last_error = None;
        job.next_run_at = Some(job.first_run_after(finished_at));
        write_job(&tx, &job, false)?;
        tx.commit()?;
        Ok::<_, rusqlite::Error>(true)
    })
    .await
    .map_err(db_err)
}

/// Bookkeeping after a failed run: only `last_error` changes.
pub async fn record_failure(conn: &Connection, id: &str, error: String) -> Result<bool> {
    let id = id.to_string();
    let changed = conn
        .call(move |c| {
            c.execute(
                "UPDATE jobs SET last_error = ?2 WHERE id = ?1",
                params![id, error],
            )
        })
        .await
        .map_err(db_err)?;
    Ok(changed > 0)
}
