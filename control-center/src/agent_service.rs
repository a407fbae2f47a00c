// Liveness of the agent's Windows service, plus the best-effort restart the
// mode toggle offers. Every probe failure collapses to Unknown; the status
// reducer treats that the same as stopped rather than guessing.

use crate::types::AgentHealth;

#[cfg(windows)]
const STOP_WAIT: std::time::Duration = std::time::Duration::from_secs(10);
#[cfg(windows)]
const STOP_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(200);

// Seam so ActionController can be driven against a fake service in tests.
pub trait ServiceControl {
  fn restart(&self) -> anyhow::Result<()>;
}

pub struct AgentService;

impl ServiceControl for AgentService {
  fn restart(&self) -> anyhow::Result<()> {
    restart()
  }
}

#[cfg(windows)]
pub fn probe() -> AgentHealth {
  use crate::identity;
  use windows_service::service::{ServiceAccess, ServiceState};
  use windows_service::service_manager::{ServiceManager, ServiceManagerAccess};

  let manager = match ServiceManager::local_computer(None::<&str>, ServiceManagerAccess::CONNECT) {
    Ok(m) => m,
    Err(e) => {
      tracing::debug!(error = ?e, "service manager unreachable");
      return AgentHealth::Unknown;
    }
  };

  let service = match manager.open_service(
    &identity::product().service_name,
    ServiceAccess::QUERY_STATUS,
  ) {
    Ok(s) => s,
    Err(_) => return AgentHealth::Unknown,
  };

  match service.query_status() {
    Ok(status) => match status.current_state {
      ServiceState::Running => AgentHealth::Running,
      ServiceState::StartPending
      | ServiceState::StopPending
      | ServiceState::ContinuePending
      | ServiceState::PausePending => AgentHealth::Transitional,
      ServiceState::Stopped | ServiceState::Paused => AgentHealth::Stopped,
    },
    Err(_) => AgentHealth::Unknown,
  }
}

#[cfg(windows)]
pub fn restart() -> anyhow::Result<()> {
  use crate::identity;
  use anyhow::Context;
  use std::time::Instant;
  use windows_service::service::{ServiceAccess, ServiceState};
  use windows_service::service_manager::{ServiceManager, ServiceManagerAccess};

  let name = &identity::product().service_name;
  let manager = ServiceManager::local_computer(None::<&str>, ServiceManagerAccess::CONNECT)
    .context("connect to service manager")?;
  let service = manager
    .open_service(
      name,
      ServiceAccess::QUERY_STATUS | ServiceAccess::STOP | ServiceAccess::START,
    )
    .with_context(|| format!("open service {name}"))?;

  if service.query_status()?.current_state != ServiceState::Stopped {
    tracing::info!(service = %name, "stopping agent service");
    let _ = service.stop();

    let deadline = Instant::now() + STOP_WAIT;
    while service.query_status()?.current_state != ServiceState::Stopped {
      if Instant::now() >= deadline {
        anyhow::bail!("service {name} did not stop within {}s", STOP_WAIT.as_secs());
      }
      std::thread::sleep(STOP_POLL_INTERVAL);
    }
  }

  tracing::info!(service = %name, "starting agent service");
  service
    .start::<&std::ffi::OsStr>(&[])
    .with_context(|| format!("start service {name}"))?;
  Ok(())
}

#[cfg(not(windows))]
pub fn probe() -> AgentHealth {
  AgentHealth::Unknown
}

#[cfg(not(windows))]
pub fn restart() -> anyhow::Result<()> {
  anyhow::bail!("agent service restart is only supported on Windows")
}
