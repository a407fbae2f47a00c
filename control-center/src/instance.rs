// At most one control client runs per user session. The guard is a named
// mutex on Windows and an advisory file lock elsewhere; acquired on startup,
// released when the process exits. A second launch observes the held
// resource and backs off before touching anything.

use crate::identity;

pub enum Acquire {
  Acquired(InstanceGuard),
  AlreadyRunning,
}

#[cfg(windows)]
pub struct InstanceGuard {
  handle: windows::Win32::Foundation::HANDLE,
}

#[cfg(windows)]
pub fn acquire() -> anyhow::Result<Acquire> {
  use anyhow::Context;
  use windows::core::HSTRING;
  use windows::Win32::Foundation::{CloseHandle, GetLastError, ERROR_ALREADY_EXISTS, FALSE};
  use windows::Win32::System::Threading::CreateMutexW;

  // `Local\` scopes the mutex to this logon session, which is the contract:
  // one client per user session, not per machine.
  let name = format!("Local\\{}.ControlCenter", identity::product().service_name);
  let handle = unsafe { CreateMutexW(None, FALSE, &HSTRING::from(name.as_str())) }
    .context("create single-instance mutex")?;

  if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
    unsafe {
      let _ = CloseHandle(handle);
    }
    return Ok(Acquire::AlreadyRunning);
  }

  Ok(Acquire::Acquired(InstanceGuard { handle }))
}

#[cfg(windows)]
impl Drop for InstanceGuard {
  fn drop(&mut self) {
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Threading::ReleaseMutex;
    unsafe {
      let _ = ReleaseMutex(self.handle);
      let _ = CloseHandle(self.handle);
    }
  }
}

#[cfg(unix)]
pub struct InstanceGuard {
  // Held open for the life of the process; the kernel drops the flock when
  // the descriptor closes.
  _file: std::fs::File,
}

#[cfg(unix)]
pub fn acquire() -> anyhow::Result<Acquire> {
  let path = std::env::temp_dir().join(format!(
    "{}.control-center.lock",
    identity::product().service_name
  ));
  acquire_at(&path)
}

#[cfg(unix)]
fn acquire_at(path: &std::path::Path) -> anyhow::Result<Acquire> {
  use anyhow::Context;
  use std::os::unix::io::AsRawFd;

  let file = std::fs::OpenOptions::new()
    .create(true)
    .write(true)
    .open(path)
    .with_context(|| format!("open instance lock {}", path.display()))?;

  let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
  if rc != 0 {
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
      return Ok(Acquire::AlreadyRunning);
    }
    return Err(err).with_context(|| format!("lock {}", path.display()));
  }

  Ok(Acquire::Acquired(InstanceGuard { _file: file }))
}
