//! Fatal relay errors and their exit codes.
//!
//! Stream and log sink failures never show up here: they are contained in
//! the pump or sink that hit them and reported through `tracing`.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("No command provided.")]
    MissingCommand,
    #[error(transparent)]
    Usage(#[from] clap::Error),
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to wait for {command}: {source}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to start runtime: {0}")]
    Runtime(#[source] io::Error),
}

impl RelayError {
    pub fn exit_code(&self) -> u8 {
        match self {
            RelayError::MissingCommand => 1,
            RelayError::Usage(err) => err.exit_code().clamp(0, 255) as u8,
            RelayError::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound => 127,
            RelayError::Spawn { .. } | RelayError::Wait { .. } | RelayError::Runtime(_) => 126,
        }
    }
}
