// Diagnostics go to stderr and, when the agent's logs directory is writable
// from this user session, to a daily-rolling file beside the agent's own
// logs. The file layer is best-effort: a read-only logs directory degrades
// to stderr-only instead of refusing to start.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const LOG_ENV_VAR: &str = "AI_DEFENDER_CONTROL_LOG";
const LOG_FILE_NAME: &str = "control-center.log";
const RETENTION_DAYS: u64 = 14;

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

pub fn init(logs_dir: &Path) -> anyhow::Result<()> {
  let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

  let stderr_layer = tracing_subscriber::fmt::layer()
    .with_ansi(false)
    .with_writer(std::io::stderr)
    .with_target(true);

  match file_writer(logs_dir) {
    Some(writer) => {
      let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_target(true);

      tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    }
    None => {
      tracing_subscriber::registry().with(filter).with(stderr_layer).init();
    }
  }

  Ok(())
}

fn file_writer(logs_dir: &Path) -> Option<NonBlocking> {
  if fs::create_dir_all(logs_dir).is_err() {
    return None;
  }
  cleanup_old_logs(logs_dir, RETENTION_DAYS);

  let appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_NAME);
  let (writer, guard) = tracing_appender::non_blocking(appender);
  let _ = FILE_GUARD.set(guard);
  Some(writer)
}

fn cleanup_old_logs(logs_dir: &Path, retention_days: u64) {
  if retention_days == 0 {
    return;
  }

  let cutoff = SystemTime::now()
    .checked_sub(Duration::from_secs(retention_days.saturating_mul(24 * 60 * 60)))
    .unwrap_or(SystemTime::UNIX_EPOCH);

  let entries = match fs::read_dir(logs_dir) {
    Ok(e) => e,
    Err(_) => return,
  };

  for entry in entries.flatten() {
    let path: PathBuf = entry.path();
    if !is_control_log_file(&path) {
      continue;
    }

    let modified = match entry.metadata().and_then(|m| m.modified()) {
      Ok(t) => t,
      Err(_) => continue,
    };

    if modified < cutoff {
      let _ = fs::remove_file(&path);
    }
  }
}

// Only files this client wrote are ever deleted; the agent's own logs in the
// same directory are left alone.
fn is_control_log_file(path: &Path) -> bool {
  let name = match path.file_name().and_then(|n| n.to_str()) {
    Some(n) => n,
    None => return false,
  };

  name == LOG_FILE_NAME || name.starts_with("control-center.log.")
}
