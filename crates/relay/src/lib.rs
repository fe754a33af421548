//! logproxy stdio relay
//!
//! This library launches a command, relays its standard streams to and from
//! the caller unchanged, and records a filtered transcript of the traffic.
//! It is aimed at stdio servers (language servers and similar) whose
//! conversation is otherwise invisible.
//!
//! ## Architecture
//!
//! The relay works by:
//! 1. Being installed as `logproxy`, or in place of a tool whose real binary
//!    is renamed to `<tool>-orig`
//! 2. Resolving the command to launch from its own invocation name
//! 3. Spawning the command with piped stdio and pumping each stream on a
//!    single-threaded runtime
//! 4. Appending a direction-tagged copy of the traffic to `<command>.log`,
//!    with blank lines and `Content-Length`/`Content-Type` framing removed
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::process::ExitCode;
//!
//! fn main() -> ExitCode {
//!     logproxy_relay::init_tracing();
//!     match logproxy_relay::run() {
//!         Ok(code) => ExitCode::from(code),
//!         Err(err) => {
//!             eprintln!("logproxy: {err}");
//!             ExitCode::from(err.exit_code())
//!         }
//!     }
//! }
//! ```

pub use config::{LogMode, RelayConfig};
pub use error::RelayError;
pub use exec::run;
pub use filter::{render_chunk, render_stderr, Direction, TranscriptLine};
pub use invocation::{Invocation, InvocationMode};
pub use logging::init_tracing;
pub use relay::{run_relay, ParentStdio};
pub use sink::LogSink;

pub mod config;
mod error;
mod exec;
pub mod filter;
mod invocation;
mod logging;
mod relay;
mod sink;
