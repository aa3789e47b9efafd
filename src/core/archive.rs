//! Backup archive production and discovery.
//!
//! An archive is a ZIP named `<job name>_<YYYYMMDD_HHMMSS>.zip` inside the
//! job's destination directory. The timestamp in the name is the archive's
//! creation time; retention and monthly selection rely on it.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use regex::Regex;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::layout;
use super::models::Job;
use crate::error::{Error, Result};

/// Buffer size for archive output (128KB)
const BUFFER_SIZE: usize = 128 * 1024;

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// An archive produced by a job, as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful archive run.
#[derive(Debug, Clone)]
pub struct ArchiveOutcome {
    pub path: PathBuf,
    pub size: u64,
    pub entries: usize,
    pub skipped: usize,
}

/// A file selected for the archive and its name inside the ZIP.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SourceEntry {
    path: PathBuf,
    entry_name: String,
}

/// Make a job name safe to use as a file name prefix.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if cleaned.is_empty() {
        "backup".to_string()
    } else {
        cleaned
    }
}

pub fn archive_file_name(job_name: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}.zip", sanitize_name(job_name), at.format(TIMESTAMP_FORMAT))
}

fn archive_pattern(job_name: &str) -> Result<Regex> {
    let pattern = format!(
        r"^{}_(\d{{8}}_\d{{6}})\.zip$",
        regex::escape(&sanitize_name(job_name))
    );
    Regex::new(&pattern).map_err(|e| Error::Archive(format!("bad archive pattern: {}", e)))
}

/// List the archives belonging to `job_name` in `dir`, newest first.
/// A missing directory has no archives.
pub fn list_job_archives(dir: &Path, job_name: &str) -> Result<Vec<ArchiveFile>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let pattern = archive_pattern(job_name)?;
    let mut archives = Vec::new();

    for entry in fs::read_dir(dir).map_err(|e| Error::io_at("read", dir, e))? {
        let entry = entry.map_err(|e| Error::io_at("read entry in", dir, e))?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let Some(caps) = pattern.captures(file_name) else {
            continue;
        };
        let Ok(naive) = NaiveDateTime::parse_from_str(&caps[1], TIMESTAMP_FORMAT) else {
            continue;
        };
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            archives.push(ArchiveFile {
                path: entry.path(),
                created_at: naive.and_utc(),
            });
        }
    }

    archives.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.path.cmp(&a.path)));
    Ok(archives)
}

/// Build the list of files to archive from the job's include flags.
///
/// Only a missing server root is an error; missing sub-directories simply
/// contribute nothing.
fn collect_sources(job: &Job) -> Result<Vec<SourceEntry>> {
    let root = Path::new(&job.root_dir);
    if !root.is_dir() {
        return Err(Error::io(
            format!("Server root directory does not exist: {}", root.display()),
            io::Error::from(io::ErrorKind::NotFound),
        ));
    }

    let mut sources = Vec::new();

    if job.include_saves || job.include_map {
        let saves = layout::saves_dir(root, &job.map);
        let world_file = layout::map_file_name(&job.map);
        let mut files = Vec::new();
        scan_files_recursive(&saves, &mut files)?;

        for path in files {
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            let wanted = if ext == "ark" {
                job.include_map && name == world_file
            } else {
                job.include_saves && layout::SAVE_EXTENSIONS.contains(&ext)
            };
            if wanted {
                sources.push(SourceEntry {
                    path,
                    entry_name: format!("SavedArks/{}", name),
                });
            }
        }
    }

    if job.include_server_files {
        let config = layout::config_dir(root);
        for name in layout::SERVER_FILES {
            let path = config.join(name);
            if path.is_file() {
                sources.push(SourceEntry {
                    path,
                    entry_name: format!("INI Settings/{}", name),
                });
            }
        }
    }

    if job.include_plugin_configs {
        let plugins = layout::plugins_dir(root);
        if plugins.is_dir() {
            for entry in fs::read_dir(&plugins).map_err(|e| Error::io_at("read", &plugins, e))? {
                let Ok(entry) = entry else { continue };
                let config = entry.path().join(layout::PLUGIN_CONFIG_FILE);
                if config.is_file() {
                    let plugin = entry.file_name().to_string_lossy().to_string();
                    sources.push(SourceEntry {
                        path: config,
                        entry_name: format!("Plugin/{}/{}", plugin, layout::PLUGIN_CONFIG_FILE),
                    });
                }
            }
        }
    }

    sources.sort_by(|a, b| a.entry_name.cmp(&b.entry_name));
    sources.dedup_by(|a, b| a.entry_name == b.entry_name);
    Ok(sources)
}

fn scan_files_recursive(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    for entry in fs::read_dir(dir).map_err(|e| Error::io_at("read", dir, e))? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        // Use symlink_metadata to avoid following symlinks
        match path.symlink_metadata() {
            Ok(meta) if meta.is_dir() => scan_files_recursive(&path, files)?,
            Ok(meta) if meta.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable entry"),
        }
    }
    Ok(())
}

/// Produce one archive for `job` stamped with `at`.
///
/// Writes to `<name>.zip.tmp` and renames into place, so a partially written
/// archive is never visible under the final name. Source files that cannot
/// be read (typically locked by a running server) are skipped.
pub fn create_archive(job: &Job, at: DateTime<Utc>) -> Result<ArchiveOutcome> {
    let sources = collect_sources(job)?;

    let dest_dir = Path::new(&job.destination_dir);
    fs::create_dir_all(dest_dir).map_err(|e| Error::io_at("create", dest_dir, e))?;

    // Names have one-second resolution; never replace an earlier archive.
    let mut at = at;
    let mut final_path = dest_dir.join(archive_file_name(&job.name, at));
    while final_path.exists() {
        at += Duration::seconds(1);
        final_path = dest_dir.join(archive_file_name(&job.name, at));
    }
    let temp_path = final_path.with_extension("zip.tmp");

    info!(
        job = %job.name,
        sources = sources.len(),
        archive = %final_path.display(),
        "Writing backup archive"
    );

    let written = write_zip(&temp_path, &sources).and_then(|(entries, skipped)| {
        fs::rename(&temp_path, &final_path)
            .map_err(|e| Error::io_at("move archive into", &final_path, e))?;
        Ok((entries, skipped))
    });

    let (entries, skipped) = match written {
        Ok(counts) => counts,
        Err(e) => {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
    };

    verify_archive(&final_path)?;

    let size = fs::metadata(&final_path)
        .map_err(|e| Error::io_at("stat", &final_path, e))?
        .len();

    Ok(ArchiveOutcome {
        path: final_path,
        size,
        entries,
        skipped,
    })
}

fn write_zip(path: &Path, sources: &[SourceEntry]) -> Result<(usize, usize)> {
    let file = File::create(path).map_err(|e| Error::io_at("create", path, e))?;
    let mut zip = ZipWriter::new(BufWriter::with_capacity(BUFFER_SIZE, file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries = 0;
    let mut skipped = 0;

    for source in sources {
        // Read fully before starting the entry so a locked file never leaves
        // a half-written entry behind.
        let data = match read_source(&source.path) {
            Ok(data) => data,
            Err(e) => {
                warn!(path = %source.path.display(), error = %e, "Source file unreadable, skipping");
                skipped += 1;
                continue;
            }
        };

        zip.start_file(source.entry_name.clone(), options)?;
        zip.write_all(&data)
            .map_err(|e| Error::io(format!("Failed to write {} to archive", source.entry_name), e))?;
        entries += 1;
        debug!(entry = %source.entry_name, bytes = data.len(), "Added archive entry");
    }

    let writer = zip.finish()?;
    let file = writer
        .into_inner()
        .map_err(|e| Error::io("Failed to flush archive", e.into_error()))?;
    file.sync_all()
        .map_err(|e| Error::io_at("sync", path, e))?;

    Ok((entries, skipped))
}

fn read_source(path: &Path) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    Ok(data)
}

/// Re-open a finished archive and make sure its central directory parses.
pub fn verify_archive(path: &Path) -> Result<usize> {
    let file = File::open(path).map_err(|e| Error::io_at("open", path, e))?;
    let archive = ZipArchive::new(file)
        .map_err(|e| Error::Archive(format!("{} is not a valid archive: {}", path.display(), e)))?;
    Ok(archive.len())
}
