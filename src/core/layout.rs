//! On-disk layout of a dedicated server installation.
//!
//! Every path the daemon reads or writes inside a server root is derived here.

use std::path::{Path, PathBuf};

/// Suffix marking a disabled plugin folder.
pub const DISABLED_MARKER: &str = "_OFF";

const KNOWN_MAPS: &[(&str, &str)] = &[
    ("TheIsland", "TheIsland_WP"),
    ("TheCenter", "TheCenter_WP"),
    ("ScorchedEarth", "ScorchedEarth_WP"),
    ("Ragnarok", "Ragnarok_WP"),
    ("Aberration", "Aberration_WP"),
    ("Extinction", "Extinction_WP"),
    ("Valguero", "Valguero_WP"),
    ("Svartalfheim", "Svartalfheim_WP"),
    ("Astraeos", "Astraeos_WP"),
    ("Forglar", "Forglar"),
    ("Amissa", "Amissa"),
    ("LostColony", "LostColony_WP"),
];

/// Save folder name for a map. Unknown maps are used verbatim.
pub fn map_folder(map: &str) -> &str {
    KNOWN_MAPS
        .iter()
        .find(|(name, _)| *name == map)
        .map(|(_, folder)| *folder)
        .unwrap_or(map)
}

/// World file name for a map, e.g. `TheIsland_WP.ark`.
pub fn map_file_name(map: &str) -> String {
    format!("{}_WP.ark", map.trim_end_matches("_WP"))
}

pub fn saves_dir(root: &Path, map: &str) -> PathBuf {
    root.join("ShooterGame")
        .join("Saved")
        .join("SavedArks")
        .join(map_folder(map))
}

pub fn config_dir(root: &Path) -> PathBuf {
    root.join("ShooterGame")
        .join("Saved")
        .join("Config")
        .join("WindowsServer")
}

pub fn plugins_dir(root: &Path) -> PathBuf {
    root.join("ShooterGame")
        .join("Binaries")
        .join("Win64")
        .join("ArkApi")
        .join("Plugins")
}

/// Server settings files captured by `include_server_files`.
pub const SERVER_FILES: &[&str] = &["Game.ini", "GameUserSettings.ini"];

/// File extensions captured by `include_saves`.
pub const SAVE_EXTENSIONS: &[&str] = &["arkprofile", "arktribe"];

pub const PLUGIN_CONFIG_FILE: &str = "config.json";
