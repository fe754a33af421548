//! Async stdio relay between the parent and the wrapped child
//!
//! Three pumps run as independent tasks on the runtime: parent stdin into
//! the child, child stdout back out, and child stderr back out. Every chunk
//! is offered to the [`LogSink`] before it is forwarded. A pump that hits a
//! stream error stops without affecting the other two.

use crate::error::RelayError;
use crate::filter::Direction;
use crate::invocation::Invocation;
use crate::sink::LogSink;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

const CHUNK_SIZE: usize = 8192;

/// The relay's own side of the three standard streams
pub struct ParentStdio<I, O, E> {
    pub stdin: I,
    pub stdout: O,
    pub stderr: E,
}

impl ParentStdio<tokio::io::Stdin, tokio::io::Stdout, tokio::io::Stderr> {
    pub fn inherit() -> Self {
        Self {
            stdin: tokio::io::stdin(),
            stdout: tokio::io::stdout(),
            stderr: tokio::io::stderr(),
        }
    }
}

/// Where a pump sends the copy of each chunk it relays
#[derive(Debug, Clone, Copy)]
enum Tap {
    Transcript(Direction),
    Stderr,
}

impl Tap {
    fn stream(self) -> &'static str {
        match self {
            Tap::Transcript(Direction::ToChild) => "stdin",
            Tap::Transcript(Direction::FromChild) => "stdout",
            Tap::Stderr => "stderr",
        }
    }

    async fn record(self, sink: &LogSink, chunk: &[u8]) {
        match self {
            Tap::Transcript(direction) => sink.record_transcript(direction, chunk).await,
            Tap::Stderr => sink.record_stderr(chunk).await,
        }
    }
}

/// Spawn the child and relay until it exits and its output is drained.
///
/// Returns the exit code the relay should exit with.
pub async fn run_relay<I, O, E>(
    invocation: &Invocation,
    sink: LogSink,
    parent: ParentStdio<I, O, E>,
) -> Result<i32, RelayError>
where
    I: AsyncRead + Unpin + Send + 'static,
    O: AsyncWrite + Unpin + Send + 'static,
    E: AsyncWrite + Unpin + Send + 'static,
{
    sink.write_block(invocation.start_line().as_bytes()).await;

    let mut child = spawn_child(invocation)?;
    tracing::debug!(command = %invocation, pid = ?child.id(), "child started");

    let sink = Arc::new(sink);
    let stdin_pump = child.stdin.take().map(|to_child| {
        spawn_pump(
            parent.stdin,
            to_child,
            Tap::Transcript(Direction::ToChild),
            &sink,
        )
    });
    let stdout_pump = child.stdout.take().map(|from_child| {
        spawn_pump(
            from_child,
            parent.stdout,
            Tap::Transcript(Direction::FromChild),
            &sink,
        )
    });
    let stderr_pump = child
        .stderr
        .take()
        .map(|from_child| spawn_pump(from_child, parent.stderr, Tap::Stderr, &sink));

    let status = wait_for_exit(&mut child)
        .await
        .map_err(|source| RelayError::Wait {
            command: invocation.command().to_string_lossy().into_owned(),
            source,
        })?;

    for pump in [stdout_pump, stderr_pump].into_iter().flatten() {
        if let Err(err) = pump.await {
            tracing::debug!(error = %err, "output pump did not finish cleanly");
        }
    }
    // Our own stdin may never reach EOF once the child is gone
    if let Some(pump) = stdin_pump {
        pump.abort();
    }

    let code = exit_code(status);
    tracing::debug!(exit_code = code, "child exited");
    Ok(code)
}

fn spawn_child(invocation: &Invocation) -> Result<Child, RelayError> {
    Command::new(invocation.command())
        .args(invocation.args())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| RelayError::Spawn {
            command: invocation.command().to_string_lossy().into_owned(),
            source,
        })
}

fn spawn_pump<R, W>(reader: R, writer: W, tap: Tap, sink: &Arc<LogSink>) -> JoinHandle<u64>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(pump(reader, writer, tap, Arc::clone(sink)))
}

/// Copy `reader` to `writer` chunk by chunk, recording each chunk first.
/// Returns the number of bytes forwarded.
async fn pump<R, W>(mut reader: R, mut writer: W, tap: Tap, sink: Arc<LogSink>) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut forwarded = 0u64;

    loop {
        let read = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                tracing::debug!(stream = tap.stream(), error = %err, "read failed, stopping relay");
                break;
            }
        };

        let chunk = &buf[..read];
        tap.record(&sink, chunk).await;

        if let Err(err) = forward(&mut writer, chunk).await {
            tracing::debug!(stream = tap.stream(), error = %err, "write failed, stopping relay");
            break;
        }
        forwarded += read as u64;
    }

    // Closing the write side is what lets the child see EOF on its stdin
    if let Err(err) = writer.shutdown().await {
        tracing::trace!(stream = tap.stream(), error = %err, "shutdown error");
    }
    tracing::debug!(stream = tap.stream(), bytes = forwarded, "stream closed");
    forwarded
}

async fn forward<W: AsyncWrite + Unpin>(writer: &mut W, chunk: &[u8]) -> io::Result<()> {
    writer.write_all(chunk).await?;
    writer.flush().await
}

#[cfg(unix)]
async fn wait_for_exit(child: &mut Child) -> io::Result<ExitStatus> {
    use nix::sys::signal::Signal;
    use tokio::signal::unix::{signal, SignalKind};

    let (mut terminate, mut hangup) =
        match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
            (Ok(terminate), Ok(hangup)) => (terminate, hangup),
            (Err(err), _) | (_, Err(err)) => {
                tracing::warn!(error = %err, "signal forwarding unavailable");
                return child.wait().await;
            }
        };

    let pid = child.id();
    loop {
        tokio::select! {
            status = child.wait() => return status,
            Some(()) = terminate.recv() => forward_signal(pid, Signal::SIGTERM),
            Some(()) = hangup.recv() => forward_signal(pid, Signal::SIGHUP),
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_exit(child: &mut Child) -> io::Result<ExitStatus> {
    child.wait().await
}

#[cfg(unix)]
fn forward_signal(pid: Option<u32>, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        return;
    };
    tracing::debug!(pid, signal = signal.as_str(), "forwarding signal to child");
    if let Err(err) = kill(Pid::from_raw(pid as i32), signal) {
        tracing::warn!(pid, signal = signal.as_str(), error = %err, "failed to forward signal");
    }
}

/// Exit code for the relay: the child's code, or 128 + signal
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    status.code().unwrap_or(1)
}
