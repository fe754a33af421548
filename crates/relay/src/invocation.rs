//! Invocation resolution
//!
//! Decides which command the relay launches. The relay either runs under its
//! own name (`logproxy <command> [args...]`) or is installed in place of a
//! tool whose real binary was renamed to `<tool>-orig`.

use crate::config::{CANONICAL_NAME, ORIG_SUFFIX};
use crate::error::RelayError;
use clap::Parser;
use std::env;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::Path;

/// How the relay was invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    /// `logproxy <command> [args...]`
    Explicit,
    /// Installed as `<tool>`, forwarding to `<tool>-orig`
    Transparent,
}

/// The command the relay launches and the arguments forwarded to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    command: OsString,
    args: Vec<OsString>,
    mode: InvocationMode,
}

#[derive(Parser, Debug)]
#[command(name = "logproxy")]
#[command(
    version,
    about = "Run a command, relay its stdio and log a filtered transcript",
    long_about = None
)]
struct ExplicitArgs {
    /// Command to launch, followed by the arguments forwarded to it verbatim
    #[arg(value_name = "COMMAND", trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<OsString>,
}

impl Invocation {
    pub fn new(
        command: impl Into<OsString>,
        args: Vec<OsString>,
        mode: InvocationMode,
    ) -> Result<Self, RelayError> {
        let command = command.into();
        if command.is_empty() {
            return Err(RelayError::MissingCommand);
        }
        Ok(Self {
            command,
            args,
            mode,
        })
    }

    /// Resolve from the current process arguments
    pub fn from_env() -> Result<Self, RelayError> {
        Self::resolve(env::args_os())
    }

    /// Resolve from a full argument vector, program path first
    pub fn resolve<I, T>(argv: I) -> Result<Self, RelayError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();
        let program = argv.first().ok_or(RelayError::MissingCommand)?;

        if !is_canonical_name(program) {
            let command = orig_command(program);
            return Self::new(command, argv[1..].to_vec(), InvocationMode::Transparent);
        }

        let parsed = ExplicitArgs::try_parse_from(&argv)?;
        let mut words = parsed.command.into_iter();
        let command = words.next().ok_or(RelayError::MissingCommand)?;
        Self::new(command, words.collect(), InvocationMode::Explicit)
    }

    pub fn command(&self) -> &OsStr {
        &self.command
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub fn mode(&self) -> InvocationMode {
        self.mode
    }

    /// First transcript line, written before any traffic
    pub fn start_line(&self) -> String {
        format!("Starting process: {self}\n")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

fn is_canonical_name(program: &OsStr) -> bool {
    let Some(name) = Path::new(program).file_name() else {
        return false;
    };
    let name = name.to_string_lossy();
    let suffix = env::consts::EXE_SUFFIX;
    let stem = if !suffix.is_empty() && name.ends_with(suffix) {
        &name[..name.len() - suffix.len()]
    } else {
        &name[..]
    };
    stem == CANONICAL_NAME
}

/// `<program>-orig`, keeping the directory part so the renamed binary is
/// found next to the wrapper
fn orig_command(program: &OsStr) -> OsString {
    let suffix = env::consts::EXE_SUFFIX;
    let lossy = program.to_string_lossy();
    if !suffix.is_empty() && lossy.ends_with(suffix) {
        let base = &lossy[..lossy.len() - suffix.len()];
        return OsString::from(format!("{base}{ORIG_SUFFIX}{suffix}"));
    }

    let mut command = program.to_os_string();
    command.push(ORIG_SUFFIX);
    command
}
