//! Daemon configuration.
//!
//! Layered with figment: compiled defaults, then `arkd.toml` (or the file named
//! by `ARKD_CONFIG`), then `ARKD_*` environment variables, then whatever the
//! CLI passes in as overrides.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_FILE: &str = "arkd.toml";
const MIN_TICK_SECS: u64 = 1;
const MAX_TICK_SECS: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub database_file: String,
    pub log_dir: Option<PathBuf>,
    pub rpc_bind: SocketAddr,
    pub http_bind: SocketAddr,
    pub tick_interval_secs: u64,
    pub monthly_archive_dir: Option<PathBuf>,
    /// Installation directory whose immediate sub-directories are server roots.
    pub server_roots_dir: Option<PathBuf>,
    pub verbose: bool,
    pub json_logs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("arkd-data"),
            database_file: "arkd.db".to_string(),
            log_dir: None,
            rpc_bind: SocketAddr::from(([127, 0, 0, 1], 7420)),
            http_bind: SocketAddr::from(([127, 0, 0, 1], 7421)),
            tick_interval_secs: 2,
            monthly_archive_dir: None,
            server_roots_dir: None,
            verbose: false,
            json_logs: false,
        }
    }
}

impl AppConfig {
    /// Build the effective configuration. `overrides` is any serializable set
    /// of fields (typically CLI args with unset options skipped).
    pub fn new<T: Serialize>(overrides: Option<&T>) -> anyhow::Result<Self> {
        let file = std::env::var("ARKD_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("ARKD_"));

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        let config: AppConfig = figment.extract()?;
        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("logs"))
    }

    pub fn monthly_archive_dir(&self) -> PathBuf {
        self.monthly_archive_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("monthly"))
    }

    /// Scheduler cadence, clamped to 1..=5 seconds.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(
            self.tick_interval_secs
                .clamp(MIN_TICK_SECS, MAX_TICK_SECS),
        )
    }
}
