//! Leveled logging for the executor and the CLI.
//!
//! Log levels:
//! - ERROR: Runs that failed or could not start
//! - WARN: Unexpected conditions that are recoverable (aborted runs)
//! - INFO: Run start/finish notifications
//! - DEBUG: Level dispatch and barrier traces
//! - TRACE: Per-task start/finish traces
//!
//! Nothing is written until [`init_with_debug`] or [`init_to_file`] is called,
//! so the library stays silent when embedded. Debug mode can be enabled with
//! the `--debug` flag or `TASKGRAPH_DEBUG=1`; `TASKGRAPH_DEBUG=trace` adds
//! per-task traces.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::OnceLock;

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Log levels for filtering messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// Threshold requested through `TASKGRAPH_DEBUG`: `1`/`true` for debug,
/// `trace` for per-task traces.
fn env_level() -> Option<LogLevel> {
    let value = std::env::var("TASKGRAPH_DEBUG").ok()?;
    match value.to_lowercase().as_str() {
        "1" | "true" => Some(LogLevel::Debug),
        "trace" => Some(LogLevel::Trace),
        _ => None,
    }
}

/// Pick the output threshold from the `--debug` flag and the environment.
fn threshold(debug: bool, env: Option<LogLevel>) -> LogLevel {
    let flag = if debug { LogLevel::Debug } else { LogLevel::Info };
    env.map_or(flag, |level| level.max(flag))
}

/// Enable logging to stderr with an explicit debug mode setting.
pub fn init_with_debug(debug: bool) {
    LOG_LEVEL.store(threshold(debug, env_level()) as u8, Ordering::SeqCst);
    ENABLED.store(true, Ordering::SeqCst);
}

/// Enable logging and redirect it to `path` (truncated on startup).
pub fn init_to_file(path: PathBuf, debug: bool) {
    init_with_debug(debug);
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(&path, "");
    LOG_PATH.set(path).ok();
}

fn current_level() -> LogLevel {
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

fn render(level: LogLevel, msg: &str) -> String {
    let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
    format!("[{}] [{}] {}", timestamp, level.as_str(), msg)
}

/// Log a message at the specified level.
pub fn log_at(level: LogLevel, msg: &str) {
    if !ENABLED.load(Ordering::Relaxed) || level > current_level() {
        return;
    }

    let line = render(level, msg);
    match LOG_PATH.get() {
        Some(path) => {
            if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
                let _ = writeln!(file, "{}", line);
            }
        }
        None => {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
        }
    }
}

/// Log a message at INFO level.
pub fn log(msg: &str) {
    log_at(LogLevel::Info, msg);
}

/// Log a message at ERROR level.
pub fn error(msg: &str) {
    log_at(LogLevel::Error, msg);
}

/// Log a message at WARN level.
pub fn warn(msg: &str) {
    log_at(LogLevel::Warn, msg);
}

/// Log a message at DEBUG level (only in debug mode).
pub fn debug(msg: &str) {
    log_at(LogLevel::Debug, msg);
}

/// Log a message at TRACE level (very verbose).
pub fn trace(msg: &str) {
    log_at(LogLevel::Trace, msg);
}

/// Log macro for INFO level.
#[macro_export]
macro_rules! tglog {
    ($($arg:tt)*) => {
        $crate::log::log(&format!($($arg)*))
    };
}

/// Log macro for ERROR level.
#[macro_export]
macro_rules! tglog_error {
    ($($arg:tt)*) => {
        $crate::log::error(&format!($($arg)*))
    };
}

/// Log macro for WARN level.
#[macro_export]
macro_rules! tglog_warn {
    ($($arg:tt)*) => {
        $crate::log::warn(&format!($($arg)*))
    };
}

/// Log macro for DEBUG level (only logs when debug mode is enabled).
#[macro_export]
macro_rules! tglog_debug {
    ($($arg:tt)*) => {
        $crate::log::debug(&format!($($arg)*))
    };
}

/// Log macro for TRACE level.
#[macro_export]
macro_rules! tglog_trace {
    ($($arg:tt)*) => {
        $crate::log::trace(&format!($($arg)*))
    };
}
