// Invokes the agent executable with fixed argument vectors and judges it
// only by exit code, captured output, and the clock. One bounded attempt per
// command; an overrunning process is killed, never waited on open-endedly.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
pub const VERSION_TIMEOUT: Duration = Duration::from_secs(5);
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

pub const KILLSWITCH_ON_ARGS: &[&str] = &["--console", "--killswitch", "on"];
pub const KILLSWITCH_OFF_ARGS: &[&str] = &["--console", "--killswitch", "off"];
pub const VERSION_ARGS: &[&str] = &["--version"];

pub const AGENT_EXE_NAME: &str = if cfg!(windows) { "agent-core.exe" } else { "agent-core" };

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeOutcome {
  Success { stdout: String },
  Unavailable,
  LaunchFailed { message: String },
  Timeout { waited: Duration },
  NonZeroExit { code: Option<i32>, message: String },
}

impl InvokeOutcome {
  pub fn describe(&self) -> String {
    match self {
      InvokeOutcome::Success { .. } => "completed".to_string(),
      InvokeOutcome::Unavailable => "agent executable not found".to_string(),
      InvokeOutcome::LaunchFailed { message } => format!("could not launch the agent: {message}"),
      InvokeOutcome::Timeout { waited } => format!(
        "the agent did not finish within {}s and was terminated",
        waited.as_secs()
      ),
      InvokeOutcome::NonZeroExit { code, message } => {
        let exit = match code {
          Some(c) => format!("exit code {c}"),
          None => "a signal".to_string(),
        };
        if message.is_empty() {
          format!("the agent failed with {exit}")
        } else {
          format!("the agent failed with {exit}: {message}")
        }
      }
    }
  }
}

// Seam for driving actions against a simulated agent in tests.
pub trait CommandRunner {
  fn run(&self, args: &[&str], timeout: Duration) -> InvokeOutcome;
}

pub struct AgentCli {
  exe: Option<PathBuf>,
}

impl AgentCli {
  pub fn discover() -> Self {
    Self { exe: locate_agent_exe() }
  }

  pub fn exe_path(&self) -> Option<&Path> {
    self.exe.as_deref()
  }
}

impl CommandRunner for AgentCli {
  fn run(&self, args: &[&str], timeout: Duration) -> InvokeOutcome {
    let Some(exe) = self.exe.as_deref() else {
      return InvokeOutcome::Unavailable;
    };
    tracing::debug!(exe = %exe.display(), args = ?args, "invoking agent");
    run_with_timeout(exe, args, timeout)
  }
}

// Fixed search order: next to this executable first, then the agent's
// development tree. Anything less predictable would hand privileged
// commands to a binary we did not choose.
pub fn locate_agent_exe() -> Option<PathBuf> {
  let mut candidates: Vec<PathBuf> = Vec::new();
  if let Ok(own) = std::env::current_exe() {
    if let Some(dir) = own.parent() {
      candidates.push(dir.join(AGENT_EXE_NAME));
    }
  }
  candidates.push(
    PathBuf::from("..")
      .join("agent-core")
      .join("target")
      .join("debug")
      .join(AGENT_EXE_NAME),
  );

  candidates.into_iter().find(|p| p.is_file())
}

fn run_with_timeout(exe: &Path, args: &[&str], timeout: Duration) -> InvokeOutcome {
  let mut command = Command::new(exe);
  command.args(args);
  command.stdin(Stdio::null());
  command.stdout(Stdio::piped());
  command.stderr(Stdio::piped());

  let mut child = match command.spawn() {
    Ok(c) => c,
    Err(e) => {
      return InvokeOutcome::LaunchFailed { message: e.to_string() };
    }
  };

  let stdout_handle = spawn_output_reader(child.stdout.take());
  let stderr_handle = spawn_output_reader(child.stderr.take());

  let start = Instant::now();
  let mut exit_status = None;
  while start.elapsed() <= timeout {
    match child.try_wait() {
      Ok(Some(status)) => {
        exit_status = Some(status);
        break;
      }
      Ok(None) => {}
      Err(e) => {
        let _ = child.kill();
        let _ = child.wait();
        return InvokeOutcome::LaunchFailed { message: format!("wait failed: {e}") };
      }
    }
    thread::sleep(WAIT_POLL_INTERVAL);
  }

  let Some(status) = exit_status else {
    let _ = child.kill();
    let _ = child.wait();
    tracing::warn!(
      exe = %exe.display(),
      timeout_secs = timeout.as_secs(),
      "agent command overran its deadline; killed"
    );
    return InvokeOutcome::Timeout { waited: timeout };
  };

  let stdout = join_output(stdout_handle);
  let stderr = join_output(stderr_handle);

  if status.success() {
    InvokeOutcome::Success { stdout: stdout.trim().to_string() }
  } else {
    InvokeOutcome::NonZeroExit {
      code: status.code(),
      message: diagnostic(&stdout, &stderr),
    }
  }
}

// stderr if the agent wrote any, otherwise stdout.
fn diagnostic(stdout: &str, stderr: &str) -> String {
  let err = stderr.trim();
  if !err.is_empty() {
    return err.to_string();
  }
  stdout.trim().to_string()
}

fn spawn_output_reader<R>(pipe: Option<R>) -> thread::JoinHandle<String>
where
  R: Read + Send + 'static,
{
  thread::spawn(move || {
    let mut buf = Vec::new();
    if let Some(mut reader) = pipe {
      let _ = reader.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).to_string()
  })
}

fn join_output(handle: thread::JoinHandle<String>) -> String {
  handle.join().unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;

  fn sh(args: &[&str], timeout: Duration) -> InvokeOutcome {
    run_with_timeout(Path::new("/bin/sh"), args, timeout)
  }

  #[test]
  fn zero_exit_carries_trimmed_stdout() {
    let out = sh(&["-c", "echo ok"], Duration::from_secs(5));
    assert_eq!(out, InvokeOutcome::Success { stdout: "ok".to_string() });
  }

  #[test]
  fn nonzero_exit_prefers_stderr() {
    let out = sh(
      &["-c", "echo ignored; echo broken >&2; exit 3"],
      Duration::from_secs(5),
    );
    match out {
      InvokeOutcome::NonZeroExit { code, message } => {
        assert_eq!(code, Some(3));
        assert_eq!(message, "broken");
      }
      other => panic!("expected nonzero exit, got {other:?}"),
    }
  }

  #[test]
  fn nonzero_exit_falls_back_to_stdout() {
    let out = sh(&["-c", "echo only-stdout; exit 2"], Duration::from_secs(5));
    match out {
      InvokeOutcome::NonZeroExit { code, message } => {
        assert_eq!(code, Some(2));
        assert_eq!(message, "only-stdout");
      }
      other => panic!("expected nonzero exit, got {other:?}"),
    }
  }

  #[test]
  fn overrunning_child_is_killed_at_the_deadline() {
    let started = Instant::now();
    let out = sh(&["-c", "sleep 5"], Duration::from_millis(300));
    let elapsed = started.elapsed();
    assert!(matches!(out, InvokeOutcome::Timeout { .. }), "got {out:?}");
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_secs(3), "kill was not prompt: {elapsed:?}");
  }

  #[test]
  fn missing_binary_is_a_launch_failure() {
    let out = run_with_timeout(
      Path::new("/nonexistent/agent-core"),
      VERSION_ARGS,
      Duration::from_secs(1),
    );
    assert!(matches!(out, InvokeOutcome::LaunchFailed { .. }), "got {out:?}");
  }

  #[test]
  fn runner_without_located_exe_reports_unavailable() {
    let cli = AgentCli { exe: None };
    assert_eq!(cli.run(VERSION_ARGS, Duration::from_secs(1)), InvokeOutcome::Unavailable);
  }
}
