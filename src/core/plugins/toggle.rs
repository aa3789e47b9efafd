use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info};

use super::{base_name, folder_name_for, is_disabled};
use crate::core::layout;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToggleAllReport {
    /// New paths of the folders that were renamed.
    pub toggled: Vec<PathBuf>,
    pub errors: Vec<String>,
}

/// Flip the folder at `folder` to the opposite state. Returns the new path.
///
/// Fails with `Conflict` when a folder with the target name already exists;
/// neither folder is touched in that case.
pub fn toggle_single(folder: &Path) -> Result<PathBuf> {
    if !folder.is_dir() {
        return Err(Error::NotFound(format!(
            "Folder does not exist: {}",
            folder.display()
        )));
    }

    let name = folder
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Validation(format!("Invalid folder name: {}", folder.display())))?;
    let parent = folder
        .parent()
        .ok_or_else(|| Error::Validation(format!("Invalid folder path: {}", folder.display())))?;

    let target = parent.join(folder_name_for(base_name(name), !is_disabled(name)));
    if target.exists() {
        return Err(Error::Conflict(format!(
            "{} already exists",
            target.display()
        )));
    }

    fs::rename(folder, &target).map_err(|e| Error::io_at("rename", folder, e))?;
    info!(from = %folder.display(), to = %target.display(), "Toggled plugin folder");
    Ok(target)
}

/// Bring `base` into the target state on every server root.
///
/// Servers without the plugin, or where it is already in the target state,
/// are skipped. A failed rename is recorded and the remaining servers are
/// still processed.
pub fn toggle_all(roots: &[PathBuf], base: &str, target_disabled: bool) -> ToggleAllReport {
    let base = base_name(base);
    let mut report = ToggleAllReport::default();

    for root in roots {
        let plugins = layout::plugins_dir(root);
        if !plugins.is_dir() {
            continue;
        }

        let target = plugins.join(folder_name_for(base, target_disabled));
        if target.exists() {
            continue;
        }

        let current = plugins.join(folder_name_for(base, !target_disabled));
        if !current.is_dir() {
            continue;
        }

        match fs::rename(&current, &target) {
            Ok(()) => {
                info!(from = %current.display(), to = %target.display(), "Toggled plugin folder");
                report.toggled.push(target);
            }
            Err(e) => {
                error!(from = %current.display(), to = %target.display(), error = %e, "Failed to toggle plugin folder");
                report.errors.push(format!(
                    "Failed to rename {} to {}: {}",
                    current.display(),
                    target.display(),
                    e
                ));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_toggle_single_round_trip() {
        let temp = tempdir().unwrap();
        let shop = temp.path().join("Shop");
        fs::create_dir(&shop).unwrap();

        let off = toggle_single(&shop).unwrap();
        assert_eq!(off, temp.path().join("Shop_OFF"));
        assert!(off.is_dir() && !shop.exists());

        let on = toggle_single(&off).unwrap();
        assert_eq!(on, shop);
        assert!(shop.is_dir());
    }

    #[test]
    fn test_toggle_single_conflict_leaves_both() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join("Shop")).unwrap();
        fs::create_dir(temp.path().join("Shop_OFF")).unwrap();

        let err = toggle_single(&temp.path().join("Shop")).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert!(temp.path().join("Shop").is_dir());
        assert!(temp.path().join("Shop_OFF").is_dir());
    }

    #[test]
    fn test_toggle_single_missing_folder() {
        let temp = tempdir().unwrap();
        let err = toggle_single(&temp.path().join("Nope")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_toggle_all_skips_servers_without_plugin() {
        let temp = tempdir().unwrap();
        let with = temp.path().join("a");
        let already = temp.path().join("b");
        let without = temp.path().join("c");
        fs::create_dir_all(layout::plugins_dir(&with).join("MyMod")).unwrap();
        fs::create_dir_all(layout::plugins_dir(&already).join("MyMod_OFF")).unwrap();
        fs::create_dir_all(layout::plugins_dir(&without).join("Other")).unwrap();

        let roots = vec![with.clone(), already.clone(), without.clone()];
        let report = toggle_all(&roots, "MyMod", true);

        assert_eq!(report.toggled, vec![layout::plugins_dir(&with).join("MyMod_OFF")]);
        assert!(report.errors.is_empty());
        assert!(layout::plugins_dir(&without).join("Other").is_dir());
        assert!(!layout::plugins_dir(&without).join("MyMod_OFF").exists());
    }
}
