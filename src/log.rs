//! Logging setup for maestro.
//!
//! Log levels:
//! - ERROR: Failures the coordinator cannot route through recovery
//! - WARN: Task failures, escalations and unexpected but recoverable input
//! - INFO: Job submission, completion and coordinator lifecycle
//! - DEBUG: Dispatch, selection and recovery decisions
//! - TRACE: Queue traffic
//!
//! Debug mode can be enabled with `--debug` flag or `MAESTRO_DEBUG=1` env var.
//! `RUST_LOG` takes precedence over both.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

use tracing_subscriber::EnvFilter;

pub const ENV_DEBUG: &str = "MAESTRO_DEBUG";

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);
static INITIALIZED: AtomicBool = AtomicBool::new(false);
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Initialize logging to ~/.maestro/maestro.log
pub fn init() {
    init_with_debug(false);
}

/// Initialize logging with explicit debug mode setting.
///
/// Calling this more than once keeps the first subscriber and its file.
pub fn init_with_debug(debug: bool) {
    init_in(dirs::home_dir().map(|home| home.join(".maestro")), debug);
}

fn init_in(dir: Option<PathBuf>, debug: bool) {
    let debug_enabled = debug || env_debug();
    DEBUG_ENABLED.store(debug_enabled, Ordering::SeqCst);

    // The installed subscriber may still be writing to the log file
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("logging already initialized");
        return;
    }

    let default_level = if debug_enabled { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    let result = match dir.and_then(|dir| open_log_file(&dir)) {
        Some((path, file)) => {
            let _ = LOG_PATH.set(path);
            builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    if result.is_err() {
        tracing::debug!("another subscriber is already installed");
    }
}

fn env_debug() -> bool {
    debug_value(std::env::var(ENV_DEBUG).ok().as_deref())
}

fn debug_value(value: Option<&str>) -> bool {
    value.is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

fn open_log_file(dir: &Path) -> Option<(PathBuf, File)> {
    std::fs::create_dir_all(dir).ok()?;
    let path = dir.join("maestro.log");
    let file = OpenOptions::new().create(true).append(true).open(&path).ok()?;
    // Truncate file on startup
    file.set_len(0).ok()?;
    Some((path, file))
}

/// Check if debug mode is enabled.
pub fn is_debug() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// Path of the active log file, if logging to a file.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}
