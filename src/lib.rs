pub mod access;
pub mod config;
pub mod confirmation;
pub mod context;
pub mod db;
pub mod engine;
pub mod errors;
pub mod fallback;
pub mod filters;
pub mod models;
mod mutations;
pub mod policy;
pub mod query;
pub mod redaction;
pub mod shaping;

pub use crate::access::{AccessProfile, PermissionResolver};
pub use crate::config::EngineConfig;
pub use crate::context::{ToolConfirmation, ToolContext, UiComponentType};
pub use crate::db::{DataStore, SqliteStore};
pub use crate::engine::ActivityEngine;
pub use crate::errors::{AppError, AppResult};
pub use crate::models::{ToolResponse, ToolStatus};

use std::path::Path;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Installs the JSON file logger under `<data_dir>/logs`. `RUST_LOG` overrides the
/// default `info` filter. Safe to call more than once; later calls are no-ops.
pub fn init_tracing(data_dir: &Path) -> AppResult<()> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "activity-engine.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    if LOG_GUARD.set(guard).is_err() {
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}

/// Opens (or creates) the SQLite store at `db_path` and wraps it in an engine using the
/// configuration at `config_path`, or the defaults when none is given.
pub fn open_engine(db_path: &Path, config_path: Option<&Path>) -> AppResult<ActivityEngine> {
    let config = match config_path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let store = SqliteStore::open(db_path)?;
    tracing::info!(
        db_path = %db_path.display(),
        list_max_limit = config.pagination.list_max_limit,
        "activity engine ready"
    );
    Ok(ActivityEngine::new(Arc::new(store), config))
}
