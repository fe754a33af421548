#![cfg(unix)]
//! Integration tests for the logproxy relay
//!
//! These drive the compiled binary the way it is deployed: installed as
//! `logproxy` for explicit use, or copied over a tool name with the real
//! binary renamed to `<tool>-orig`.

use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const CONFIG_VARS: &[&str] = &[
    "LOGPROXY_LOG_DIR",
    "LOGPROXY_LOG_APPEND",
    "LOGPROXY_BYPASS",
    "LOGPROXY_LOG",
];

struct Workspace {
    _temp: TempDir,
    bin_dir: PathBuf,
    work_dir: PathBuf,
}

impl Workspace {
    fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        let bin_dir = temp.path().join("bin");
        let work_dir = temp.path().join("work");
        fs::create_dir(&bin_dir)?;
        fs::create_dir(&work_dir)?;
        Ok(Self {
            _temp: temp,
            bin_dir,
            work_dir,
        })
    }

    /// Copy the relay binary into the bin dir under `name`
    fn install_as(&self, name: &str) -> Result<PathBuf> {
        let target = self.bin_dir.join(name);
        fs::copy(env!("CARGO_BIN_EXE_logproxy_relay_test_bin"), &target)?;
        make_executable(&target)?;
        Ok(target)
    }

    fn write_script(&self, name: &str, body: &str) -> Result<PathBuf> {
        let target = self.bin_dir.join(name);
        fs::write(&target, body)?;
        make_executable(&target)?;
        Ok(target)
    }

    fn command(&self, binary: &Path) -> Command {
        let mut cmd = Command::new(binary);
        cmd.current_dir(&self.work_dir);
        for var in CONFIG_VARS {
            cmd.env_remove(var);
        }
        cmd
    }

    fn read_log(&self, name: &str) -> Result<String> {
        Ok(fs::read_to_string(self.work_dir.join(name))?)
    }

    fn log_files(&self) -> Result<Vec<PathBuf>> {
        let mut logs = Vec::new();
        for entry in fs::read_dir(&self.work_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "log") {
                logs.push(path);
            }
        }
        Ok(logs)
    }
}

/// Poll until `name` in the work dir contains `needle`
fn wait_for_log(ws: &Workspace, name: &str, needle: &str) -> Result<String> {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let log = ws.read_log(name).unwrap_or_default();
        if log.contains(needle) {
            return Ok(log);
        }
        if Instant::now() > deadline {
            anyhow::bail!("timed out waiting for {needle:?} in {name}: {log}");
        }
        thread::sleep(Duration::from_millis(20));
    }
}

fn make_executable(path: &Path) -> Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[test]
fn explicit_mode_relays_stdout_and_logs_body_only() -> Result<()> {
    let ws = Workspace::new()?;
    let relay = ws.install_as("logproxy")?;

    ws.command(&relay)
        .args(["sh", "-c", r#"printf 'Content-Length: 11\n\n{"ok":true}\n'"#])
        .assert()
        .success()
        .stdout("Content-Length: 11\n\n{\"ok\":true}\n");

    let log = ws.read_log("sh.log")?;
    assert!(log.starts_with("Starting process: sh -c printf "));
    assert!(log.ends_with("\n🔻{\"ok\":true}\n"), "unexpected log: {log}");
    assert!(
        log.lines().skip(1).all(|line| !line.contains("Content-Length")),
        "framing header leaked into transcript: {log}"
    );
    Ok(())
}

#[test]
fn explicit_mode_forwards_flags_after_command() -> Result<()> {
    let ws = Workspace::new()?;
    let relay = ws.install_as("logproxy")?;

    ws.command(&relay)
        .args(["sh", "-c", r#"echo "$@""#, "sh", "--bar", "-x", "--help"])
        .assert()
        .success()
        .stdout("--bar -x --help\n");
    Ok(())
}

#[test]
fn stdin_is_relayed_to_child_and_logged() -> Result<()> {
    let ws = Workspace::new()?;
    let relay = ws.install_as("logproxy")?;
    let request = "Content-Length: 17\r\n\r\n{\"method\":\"ping\"}";

    ws.command(&relay)
        .arg("cat")
        .write_stdin(request)
        .assert()
        .success()
        .stdout(request);

    let log = ws.read_log("cat.log")?;
    assert!(log.starts_with("Starting process: cat\n"));
    assert!(log.contains("🔼{\"method\":\"ping\"}\n"), "unexpected log: {log}");
    assert!(log.contains("🔻{\"method\":\"ping\"}\n"), "unexpected log: {log}");
    assert!(!log.contains("Content-Length"));
    Ok(())
}

#[test]
fn transparent_mode_runs_orig_binary() -> Result<()> {
    let ws = Workspace::new()?;
    let wrapper = ws.install_as("mytool")?;
    ws.write_script("mytool-orig", "#!/bin/sh\necho \"orig: $*\"\n")?;

    ws.command(&wrapper)
        .args(["x", "y"])
        .assert()
        .success()
        .stdout("orig: x y\n");

    let log = ws.read_log("mytool-orig.log")?;
    let expected = format!(
        "Starting process: {} x y\n🔻orig: x y\n",
        ws.bin_dir.join("mytool-orig").display()
    );
    assert_eq!(log, expected);
    Ok(())
}

#[test]
fn missing_command_fails_without_transcript() -> Result<()> {
    let ws = Workspace::new()?;
    let relay = ws.install_as("logproxy")?;

    ws.command(&relay)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No command provided."));

    assert!(ws.log_files()?.is_empty());
    Ok(())
}

#[test]
fn child_exit_code_is_forwarded() -> Result<()> {
    let ws = Workspace::new()?;
    let relay = ws.install_as("logproxy")?;

    ws.command(&relay)
        .args(["sh", "-c", "exit 42"])
        .assert()
        .code(42);
    Ok(())
}

#[test]
fn unknown_command_exits_127() -> Result<()> {
    let ws = Workspace::new()?;
    let relay = ws.install_as("logproxy")?;

    ws.command(&relay)
        .arg("logproxy-test-no-such-command")
        .assert()
        .code(127)
        .stderr(predicate::str::contains(
            "failed to spawn logproxy-test-no-such-command",
        ));
    Ok(())
}

#[test]
fn stderr_is_logged_raw() -> Result<()> {
    let ws = Workspace::new()?;
    let relay = ws.install_as("logproxy")?;

    ws.command(&relay)
        .args(["sh", "-c", "echo 'Content-Length: 9' >&2"])
        .assert()
        .success()
        .stderr("Content-Length: 9\n");

    let log = ws.read_log("sh.log")?;
    assert!(log.contains("E Content-Length: 9\n\n"), "unexpected log: {log}");
    Ok(())
}

#[test]
fn log_is_truncated_unless_append_requested() -> Result<()> {
    let ws = Workspace::new()?;
    let relay = ws.install_as("logproxy")?;

    for _ in 0..2 {
        ws.command(&relay).args(["echo", "hi"]).assert().success();
    }
    assert_eq!(ws.read_log("echo.log")?, "Starting process: echo hi\n🔻hi\n");

    ws.command(&relay)
        .env("LOGPROXY_LOG_APPEND", "1")
        .args(["echo", "again"])
        .assert()
        .success();
    assert_eq!(
        ws.read_log("echo.log")?,
        "Starting process: echo hi\n🔻hi\nStarting process: echo again\n🔻again\n"
    );
    Ok(())
}

#[test]
fn log_dir_override() -> Result<()> {
    let ws = Workspace::new()?;
    let relay = ws.install_as("logproxy")?;
    let log_dir = ws.work_dir.join("transcripts");
    fs::create_dir(&log_dir)?;

    ws.command(&relay)
        .env("LOGPROXY_LOG_DIR", &log_dir)
        .args(["echo", "elsewhere"])
        .assert()
        .success();

    let log = fs::read_to_string(log_dir.join("echo.log"))?;
    assert_eq!(log, "Starting process: echo elsewhere\n🔻elsewhere\n");
    assert!(ws.log_files()?.is_empty());
    Ok(())
}

#[test]
fn unwritable_log_does_not_stop_relay() -> Result<()> {
    let ws = Workspace::new()?;
    let relay = ws.install_as("logproxy")?;

    ws.command(&relay)
        .env("LOGPROXY_LOG_DIR", ws.work_dir.join("does-not-exist"))
        .args(["echo", "still here"])
        .assert()
        .success()
        .stdout("still here\n")
        .stderr(predicate::str::contains("transcript logging disabled"));
    Ok(())
}

#[test]
fn bypass_runs_command_without_transcript() -> Result<()> {
    let ws = Workspace::new()?;
    let relay = ws.install_as("logproxy")?;

    ws.command(&relay)
        .env("LOGPROXY_BYPASS", "1")
        .args(["sh", "-c", "echo bypassed; exit 5"])
        .assert()
        .code(5)
        .stdout("bypassed\n");

    assert!(ws.log_files()?.is_empty());
    Ok(())
}

#[test]
fn sigterm_is_forwarded_to_child() -> Result<()> {
    let ws = Workspace::new()?;
    let relay = ws.install_as("logproxy")?;

    let mut cmd = std::process::Command::new(&relay);
    cmd.current_dir(&ws.work_dir)
        .args([
            "sh",
            "-c",
            "trap 'echo got-term; exit 9' TERM; echo ready; while :; do sleep 0.05; done",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for var in CONFIG_VARS {
        cmd.env_remove(var);
    }
    let child = cmd.spawn()?;

    // "ready" is logged only after the trap is set and the relay is waiting
    wait_for_log(&ws, "sh.log", "🔻ready\n")?;
    kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM)?;

    let output = child.wait_with_output()?;
    assert_eq!(output.status.code(), Some(9));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "ready\ngot-term\n");

    let log = wait_for_log(&ws, "sh.log", "🔻got-term\n")?;
    assert!(log.starts_with("Starting process: sh -c "), "unexpected log: {log}");
    Ok(())
}
