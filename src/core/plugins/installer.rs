use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::{Error, Result};

/// Buffer size for file I/O operations (128KB)
const BUFFER_SIZE: usize = 128 * 1024;

const TEMP_SUFFIX: &str = ".arkd-tmp";

/// Aggregated result of an install; `errors` is non-empty on partial failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub files_copied: usize,
    pub files_overwritten: usize,
    pub errors: Vec<String>,
}

/// Copy every source plugin folder into every destination plugin directory.
///
/// Each source lands in `<destination>/<source folder name>`. Existing files
/// are replaced and counted as overwritten; files only present at the
/// destination are left alone. Each (source, destination) pair is attempted
/// independently.
pub fn install(sources: &[PathBuf], destinations: &[PathBuf]) -> InstallReport {
    let mut report = InstallReport::default();

    for source in sources {
        let Some(plugin_name) = source.file_name() else {
            report
                .errors
                .push(format!("Invalid source plugin path: {}", source.display()));
            continue;
        };
        if !source.is_dir() {
            report
                .errors
                .push(format!("Source plugin not found: {}", source.display()));
            continue;
        }

        for destination in destinations {
            let target = destination.join(plugin_name);
            if let Err(e) = copy_tree(source, &target, &mut report) {
                let message = format!(
                    "Failed to copy {} to {}: {}",
                    plugin_name.to_string_lossy(),
                    destination.display(),
                    e
                );
                error!("{}", message);
                report.errors.push(message);
            }
        }
    }

    info!(
        files_copied = report.files_copied,
        files_overwritten = report.files_overwritten,
        errors = report.errors.len(),
        "Plugin install finished"
    );
    report
}

/// Recursively copy `source` into `target`. Counters are updated per file,
/// so files copied before a failure are still reported.
fn copy_tree(source: &Path, target: &Path, report: &mut InstallReport) -> Result<()> {
    fs::create_dir_all(target).map_err(|e| Error::io_at("create", target, e))?;

    for entry in fs::read_dir(source).map_err(|e| Error::io_at("read", source, e))? {
        let entry = entry.map_err(|e| Error::io_at("read entry in", source, e))?;
        let path = entry.path();
        let dest = target.join(entry.file_name());

        if path.is_dir() {
            copy_tree(&path, &dest, report)?;
            continue;
        }

        let existed = dest.exists();
        replace_file(&path, &dest)?;
        if existed {
            report.files_overwritten += 1;
        } else {
            report.files_copied += 1;
        }
        debug!(file = %dest.display(), overwritten = existed, "Installed plugin file");
    }

    Ok(())
}

/// Replace `dest` with a copy of `source` without ever exposing a partially
/// written file: the data goes to a sibling temp file that is renamed over
/// `dest`.
fn replace_file(source: &Path, dest: &Path) -> Result<()> {
    let temp = temp_path(dest);

    let result = write_copy(source, &temp).and_then(|()| {
        if dest.exists() {
            make_writable(dest);
        }
        fs::rename(&temp, dest).map_err(|e| Error::io_at("replace", dest, e))
    });

    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

fn write_copy(source: &Path, temp: &Path) -> Result<()> {
    let metadata = fs::metadata(source).map_err(|e| Error::io_at("stat", source, e))?;
    let input = File::open(source).map_err(|e| Error::io_at("open", source, e))?;
    let output = File::create(temp).map_err(|e| Error::io_at("create", temp, e))?;

    let mut reader = BufReader::with_capacity(BUFFER_SIZE, input);
    let mut writer = BufWriter::with_capacity(BUFFER_SIZE, output);
    io::copy(&mut reader, &mut writer).map_err(|e| Error::io_at("copy", source, e))?;
    writer.flush().map_err(|e| Error::io_at("flush", temp, e))?;

    let file = writer
        .into_inner()
        .map_err(|e| Error::io_at("flush", temp, e.into_error()))?;
    file.sync_all().map_err(|e| Error::io_at("sync", temp, e))?;
    drop(file);

    // Preserve timestamps
    let atime = filetime::FileTime::from_last_access_time(&metadata);
    let mtime = filetime::FileTime::from_last_modification_time(&metadata);
    if let Err(e) = filetime::set_file_times(temp, atime, mtime) {
        debug!(dest = %temp.display(), error = %e, "Failed to preserve file timestamps");
    }

    Ok(())
}

fn temp_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(TEMP_SUFFIX);
    dest.with_file_name(name)
}

/// Clear the read-only flag so the file can be replaced on Windows.
fn make_writable(path: &Path) {
    let Ok(metadata) = fs::metadata(path) else {
        return;
    };
    let mut permissions = metadata.permissions();
    if !permissions.readonly() {
        return;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        permissions.set_mode(permissions.mode() | 0o200);
    }
    #[cfg(not(unix))]
    permissions.set_readonly(false);

    if let Err(e) = fs::set_permissions(path, permissions) {
        debug!(path = %path.display(), error = %e, "Failed to clear read-only flag");
    }
}
