//! arkd: backup scheduler and plugin manager for dedicated ARK servers.

pub mod config;
pub mod context;
pub mod core;
pub mod db;
pub mod error;
pub mod logging;
pub mod rpc;
pub mod service;
pub mod web;

pub use error::{Error, Result};
