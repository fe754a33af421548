//! Transcript log sink
//!
//! One file per relay run, shared by the stdin, stdout and stderr pumps.
//! Logging is best-effort: a sink that cannot be opened is disabled, and
//! write failures are reported once and otherwise ignored.

use crate::config::LogMode;
use crate::filter::{render_chunk, render_stderr, Direction};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct LogSink {
    path: PathBuf,
    // Held across write_all + flush so blocks from different pumps never interleave
    file: Option<Mutex<File>>,
    write_failed: AtomicBool,
}

impl LogSink {
    pub async fn open(path: impl Into<PathBuf>, mode: LogMode) -> Result<Self> {
        let path = path.into();
        let mut options = OpenOptions::new();
        options.create(true);
        match mode {
            LogMode::Truncate => options.write(true).truncate(true),
            LogMode::Append => options.append(true),
        };

        let file = options
            .open(&path)
            .await
            .with_context(|| format!("Failed to open transcript log {}", path.display()))?;

        Ok(Self {
            path,
            file: Some(Mutex::new(file)),
            write_failed: AtomicBool::new(false),
        })
    }

    /// Open the sink, or fall back to a disabled one so relaying can go on
    pub async fn open_or_disabled(path: impl Into<PathBuf>, mode: LogMode) -> Self {
        let path = path.into();
        match Self::open(&path, mode).await {
            Ok(sink) => sink,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "transcript logging disabled");
                Self::disabled(path)
            }
        }
    }

    pub fn disabled(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
            write_failed: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    /// Append one block atomically with respect to other writers
    pub async fn write_block(&self, block: &[u8]) {
        let Some(file) = &self.file else {
            return;
        };

        let mut file = file.lock().await;
        let result = match file.write_all(block).await {
            Ok(()) => file.flush().await,
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            if !self.write_failed.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to write transcript log; further failures are not reported"
                );
            }
        }
    }

    /// Filter a chunk of relayed traffic and append what survives
    pub async fn record_transcript(&self, direction: Direction, chunk: &[u8]) {
        if let Some(block) = render_chunk(direction, chunk) {
            self.write_block(block.as_bytes()).await;
        }
    }

    /// Append a chunk of child stderr unfiltered
    pub async fn record_stderr(&self, chunk: &[u8]) {
        self.write_block(&render_stderr(chunk)).await;
    }
}
