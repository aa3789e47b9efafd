//! RPC method dispatch.
//!
//! Method names are the command names of the daemon (`list_jobs`,
//! `toggle_plugin_folder`, ...). Parameters are objects with snake_case keys.

use std::path::PathBuf;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::context::AppContext;
use crate::core::{DaemonEvent, JobDraft};
use crate::error::Result;
use crate::service::Service;

use super::protocol::{Request, Response};

/// Handles RPC method dispatch and execution.
pub struct MethodHandler {
    service: Service,
}

#[derive(Deserialize)]
struct IdParams {
    id: String,
}

#[derive(Deserialize)]
struct JobParams {
    job: JobDraft,
}

#[derive(Deserialize)]
struct SourcePathParams {
    source_path: PathBuf,
}

#[derive(Deserialize)]
struct InstallParams {
    source_plugin_paths: Vec<PathBuf>,
    destination_plugin_paths: Vec<PathBuf>,
}

#[derive(Deserialize)]
struct ServerRootParams {
    server_root: PathBuf,
}

#[derive(Deserialize)]
struct FolderParams {
    folder_path: PathBuf,
}

#[derive(Deserialize)]
struct ToggleAllParams {
    base_folder_name: String,
    target_state_disabled: bool,
}

#[derive(Deserialize, Default)]
struct LogParams {
    #[serde(default)]
    lines: Option<usize>,
}

impl MethodHandler {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            service: Service::new(ctx),
        }
    }

    /// Daemon events for push notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<DaemonEvent> {
        self.service.context().status.subscribe()
    }

    /// Handle an RPC request and return a response.
    pub async fn handle(&self, request: Request) -> Response {
        let id = request.id.clone().unwrap_or(Value::Null);
        let params = request.params.unwrap_or(Value::Null);
        let s = &self.service;

        match request.method.as_str() {
            "list_jobs" => reply(id, s.list_jobs().await),
            "add_job" => match parse::<JobParams>(params) {
                Ok(p) => reply(id, s.add_job(p.job).await),
                Err(e) => Response::invalid_params(id, e),
            },
            "update_job" => match parse::<JobParams>(params) {
                Ok(p) => reply(id, s.update_job(p.job).await),
                Err(e) => Response::invalid_params(id, e),
            },
            "delete_job" => match parse::<IdParams>(params) {
                Ok(p) => reply(id, s.delete_job(&p.id).await),
                Err(e) => Response::invalid_params(id, e),
            },
            "run_job_now" => match parse::<IdParams>(params) {
                Ok(p) => reply(id, s.run_job_now(&p.id).await),
                Err(e) => Response::invalid_params(id, e),
            },
            "get_status" => Response::success(id, s.get_status().await),
            "preview_monthly_archive" => reply(id, s.preview_monthly_archive().await),
            "run_monthly_archive" => reply(id, s.run_monthly_archive().await),
            "discover_plugin_destinations" => reply(id, s.discover_plugin_destinations().await),
            "list_source_plugins" => match parse::<SourcePathParams>(params) {
                Ok(p) => reply(id, s.list_source_plugins(p.source_path).await),
                Err(e) => Response::invalid_params(id, e),
            },
            "install_plugins" => match parse::<InstallParams>(params) {
                Ok(p) => reply(
                    id,
                    s.install_plugins(p.source_plugin_paths, p.destination_plugin_paths)
                        .await,
                ),
                Err(e) => Response::invalid_params(id, e),
            },
            "get_plugin_server_roots" => reply(id, s.get_plugin_server_roots().await),
            "list_plugin_folders" => match parse::<ServerRootParams>(params) {
                Ok(p) => reply(id, s.list_plugin_folders(p.server_root).await),
                Err(e) => Response::invalid_params(id, e),
            },
            "toggle_plugin_folder" => match parse::<FolderParams>(params) {
                Ok(p) => reply(id, s.toggle_plugin_folder(p.folder_path).await),
                Err(e) => Response::invalid_params(id, e),
            },
            "toggle_plugin_for_all_servers" => match parse::<ToggleAllParams>(params) {
                Ok(p) => reply(
                    id,
                    s.toggle_plugin_for_all_servers(p.base_folder_name, p.target_state_disabled)
                        .await,
                ),
                Err(e) => Response::invalid_params(id, e),
            },
            "read_logs" => match parse_or_default::<LogParams>(params) {
                Ok(p) => reply(id, s.read_logs(p.lines).await),
                Err(e) => Response::invalid_params(id, e),
            },
            "ping" => Response::success(id, "pong"),
            _ => Response::method_not_found(id, &request.method),
        }
    }
}

fn reply<T: serde::Serialize>(id: Value, result: Result<T>) -> Response {
    match result {
        Ok(value) => Response::success(id, value),
        Err(e) => Response::from_error(id, &e),
    }
}

fn parse<T: DeserializeOwned>(params: Value) -> std::result::Result<T, String> {
    serde_json::from_value(params).map_err(|e| e.to_string())
}

/// Like [`parse`], but a missing params object yields the defaults.
fn parse_or_default<T: DeserializeOwned + Default>(params: Value) -> std::result::Result<T, String> {
    if params.is_null() {
        return Ok(T::default());
    }
    parse(params)
}
