//! Runtime configuration and environment detection
//!
//! Everything the relay reads from the environment is named here and read
//! once at startup into a [`RelayConfig`].

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Environment variable names used by the relay
pub const LOG_DIR_VAR: &str = "LOGPROXY_LOG_DIR"; // Directory for transcript files
pub const LOG_APPEND_VAR: &str = "LOGPROXY_LOG_APPEND"; // Append instead of truncating
pub const BYPASS_VAR: &str = "LOGPROXY_BYPASS"; // Run the command with no relay or transcript
pub const LOG_FILTER_VAR: &str = "LOGPROXY_LOG"; // tracing filter for diagnostics

/// Name the relay binary is installed under when used directly
pub const CANONICAL_NAME: &str = "logproxy";
/// Suffix carried by the real binary in transparent-wrapper mode
pub const ORIG_SUFFIX: &str = "-orig";
/// Suffix of the transcript file
pub const LOG_SUFFIX: &str = ".log";

/// How an existing transcript file is treated when the relay starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogMode {
    #[default]
    Truncate,
    Append,
}

/// Settings read from the environment for one relay run
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    /// Directory for the transcript; the current directory when unset
    pub log_dir: Option<PathBuf>,
    pub log_mode: LogMode,
    /// Skip relaying and logging entirely
    pub bypass: bool,
}

impl RelayConfig {
    pub fn from_env() -> Self {
        let log_dir = env::var_os(LOG_DIR_VAR)
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);

        let log_mode = if env_flag(LOG_APPEND_VAR) {
            LogMode::Append
        } else {
            LogMode::Truncate
        };

        Self {
            log_dir,
            log_mode,
            bypass: env_flag(BYPASS_VAR),
        }
    }

    /// Transcript path for `command`: `<dir>/<command file name>.log`
    pub fn log_path(&self, command: &OsStr) -> PathBuf {
        let dir = self
            .log_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        dir.join(log_file_name(command))
    }
}

fn log_file_name(command: &OsStr) -> String {
    // Commands given as paths log next to the caller, not next to the binary
    let name = Path::new(command)
        .file_name()
        .unwrap_or(command)
        .to_string_lossy();
    format!("{name}{LOG_SUFFIX}")
}

fn env_flag(key: &str) -> bool {
    match env::var(key) {
        Ok(value) => enabled_flag(&value),
        Err(_) => false,
    }
}

fn enabled_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
