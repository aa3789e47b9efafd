//! Plugin folders of dedicated servers.
//!
//! A plugin is a folder inside a server's `ArkApi/Plugins` directory. Its
//! enabled/disabled state is encoded in the folder name (a trailing `_OFF`
//! marks it disabled) and is recomputed from disk on every listing.

mod installer;
mod toggle;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

use super::layout::{self, DISABLED_MARKER};
use crate::error::{Error, Result};

pub use installer::{InstallReport, install};
pub use toggle::{ToggleAllReport, toggle_all, toggle_single};

/// An installable plugin folder in a source directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourcePlugin {
    pub name: String,
    pub path: PathBuf,
}

/// A server root that can receive plugins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerDestination {
    pub name: String,
    pub path: PathBuf,
    pub plugin_path: PathBuf,
}

/// Observed state of one plugin folder on one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginFolder {
    /// Folder name as found on disk, marker included.
    pub name: String,
    pub base_name: String,
    pub full_path: PathBuf,
    pub is_disabled: bool,
}

pub fn is_disabled(folder_name: &str) -> bool {
    folder_name.ends_with(DISABLED_MARKER)
}

/// Folder name with the disabled marker stripped.
pub fn base_name(folder_name: &str) -> &str {
    folder_name
        .strip_suffix(DISABLED_MARKER)
        .unwrap_or(folder_name)
}

/// Folder name of `base` in the given state.
pub fn folder_name_for(base: &str, disabled: bool) -> String {
    if disabled {
        format!("{}{}", base, DISABLED_MARKER)
    } else {
        base.to_string()
    }
}

/// Immediate sub-directories of `source`, sorted by name.
pub fn list_source_plugins(source: &Path) -> Result<Vec<SourcePlugin>> {
    if !source.is_dir() {
        return Err(Error::Validation(format!(
            "Source path is not a directory: {}",
            source.display()
        )));
    }

    let mut plugins: Vec<SourcePlugin> = subdirectories(source)?
        .into_iter()
        .map(|path| SourcePlugin {
            name: display_name(&path),
            path,
        })
        .collect();

    plugins.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(plugins)
}

/// Every known server root: the job roots plus the sub-directories of the
/// installation directory, sorted and deduplicated.
pub fn server_roots<'a>(
    job_roots: impl IntoIterator<Item = &'a str>,
    install_dir: Option<&Path>,
) -> Result<Vec<PathBuf>> {
    let mut roots: BTreeSet<PathBuf> = job_roots
        .into_iter()
        .filter(|r| !r.trim().is_empty())
        .map(PathBuf::from)
        .collect();

    if let Some(dir) = install_dir.filter(|d| d.is_dir()) {
        roots.extend(subdirectories(dir)?);
    }

    Ok(roots.into_iter().collect())
}

/// Plugin destinations for the given server roots, sorted by name.
pub fn discover_destinations(roots: &[PathBuf]) -> Vec<ServerDestination> {
    let mut destinations: Vec<ServerDestination> = roots
        .iter()
        .map(|root| ServerDestination {
            name: display_name(root),
            path: root.clone(),
            plugin_path: layout::plugins_dir(root),
        })
        .collect();

    destinations.sort_by(|a, b| a.name.cmp(&b.name).then(a.path.cmp(&b.path)));
    destinations
}

/// Plugin folders of one server, sorted by base name.
pub fn list_plugin_folders(server_root: &Path) -> Result<Vec<PluginFolder>> {
    let plugins = layout::plugins_dir(server_root);
    if !plugins.is_dir() {
        return Err(Error::NotFound(format!(
            "Plugins directory does not exist: {}",
            plugins.display()
        )));
    }

    let mut folders: Vec<PluginFolder> = subdirectories(&plugins)?
        .into_iter()
        .map(|full_path| {
            let name = display_name(&full_path);
            PluginFolder {
                base_name: base_name(&name).to_string(),
                is_disabled: is_disabled(&name),
                name,
                full_path,
            }
        })
        .collect();

    folders.sort_by(|a, b| a.base_name.cmp(&b.base_name).then(a.name.cmp(&b.name)));
    Ok(folders)
}

fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::io_at("read", dir, e))? {
        match entry {
            Ok(entry) if entry.path().is_dir() => dirs.push(entry.path()),
            Ok(_) => {}
            Err(e) => warn!(dir = %dir.display(), error = %e, "Error reading directory entry"),
        }
    }
    Ok(dirs)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_marker_helpers() {
        assert!(is_disabled("Shop_OFF"));
        assert!(!is_disabled("Shop"));
        assert_eq!(base_name("Shop_OFF"), "Shop");
        assert_eq!(base_name("Shop"), "Shop");
        assert_eq!(folder_name_for("Shop", true), "Shop_OFF");
        assert_eq!(folder_name_for("Shop", false), "Shop");
    }

    #[test]
    fn test_list_source_plugins_sorted_dirs_only() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join("Zeta")).unwrap();
        fs::create_dir(temp.path().join("Alpha")).unwrap();
        fs::write(temp.path().join("readme.txt"), b"x").unwrap();

        let plugins = list_source_plugins(temp.path()).unwrap();
        let names: Vec<_> = plugins.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);
    }

    #[test]
    fn test_list_source_plugins_missing_path() {
        let temp = tempdir().unwrap();
        let err = list_source_plugins(&temp.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_server_roots_union() {
        let temp = tempdir().unwrap();
        let install = temp.path().join("servers");
        fs::create_dir_all(install.join("omega")).unwrap();
        fs::create_dir_all(install.join("alpha")).unwrap();
        let job_root = install.join("alpha").display().to_string();

        let roots = server_roots([job_root.as_str(), "/srv/other"], Some(&install)).unwrap();
        let mut expected = vec![
            PathBuf::from("/srv/other"),
            install.join("alpha"),
            install.join("omega"),
        ];
        expected.sort();
        assert_eq!(roots, expected);

        let destinations = discover_destinations(&roots);
        let names: Vec<_> = destinations.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "omega", "other"]);
        assert!(destinations[0].plugin_path.ends_with("ArkApi/Plugins"));
    }

    #[test]
    fn test_list_plugin_folders_state() {
        let temp = tempdir().unwrap();
        let plugins = layout::plugins_dir(temp.path());
        fs::create_dir_all(plugins.join("Shop_OFF")).unwrap();
        fs::create_dir_all(plugins.join("Kits")).unwrap();

        let folders = list_plugin_folders(temp.path()).unwrap();
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].name, "Kits");
        assert!(!folders[0].is_disabled);
        assert_eq!(folders[1].base_name, "Shop");
        assert!(folders[1].is_disabled);
    }

    #[test]
    fn test_list_plugin_folders_missing_dir() {
        let temp = tempdir().unwrap();
        let err = list_plugin_folders(temp.path()).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
