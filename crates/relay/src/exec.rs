//! Entry point orchestration
//!
//! Resolves the invocation, reads configuration, and either runs the relay
//! on a single-threaded runtime or, in bypass mode, runs the command with
//! inherited stdio and no transcript.

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::invocation::Invocation;
use crate::relay::{exit_code, run_relay, ParentStdio};
use crate::sink::LogSink;
use std::process::Command;

/// Main relay function. Returns the exit code to terminate with.
pub fn run() -> Result<u8, RelayError> {
    let invocation = Invocation::from_env()?;
    let config = RelayConfig::from_env();
    tracing::debug!(command = %invocation, mode = ?invocation.mode(), "resolved invocation");

    let code = if config.bypass {
        run_bypass(&invocation)?
    } else {
        run_relayed(&invocation, &config)?
    };

    Ok(exit_byte(code))
}

/// Codes outside `0..=255` (Windows statuses) collapse to a generic failure
fn exit_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

fn run_relayed(invocation: &Invocation, config: &RelayConfig) -> Result<i32, RelayError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(RelayError::Runtime)?;

    let log_path = config.log_path(invocation.command());
    let result = runtime.block_on(async {
        let sink = LogSink::open_or_disabled(log_path, config.log_mode).await;
        run_relay(invocation, sink, ParentStdio::inherit()).await
    });

    // A read on our stdin can stay parked on a blocking thread forever
    runtime.shutdown_background();
    result
}

/// Run the command directly with no relay and no transcript
fn run_bypass(invocation: &Invocation) -> Result<i32, RelayError> {
    let status = Command::new(invocation.command())
        .args(invocation.args())
        .status()
        .map_err(|source| RelayError::Spawn {
            command: invocation.command().to_string_lossy().into_owned(),
            source,
        })?;

    Ok(exit_code(status))
}
