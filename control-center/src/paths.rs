// The agent owns every file below; names must match what it writes.

use crate::identity;
use std::path::{Path, PathBuf};

pub fn base_dir() -> anyhow::Result<PathBuf> {
  let program_data = std::env::var("ProgramData").unwrap_or_else(|_| "C:\\ProgramData".into());
  Ok(PathBuf::from(program_data).join(&identity::product().name))
}

pub fn config_path(base: &Path) -> PathBuf {
  base.join("config.toml")
}

pub fn logs_dir(base: &Path) -> PathBuf {
  base.join("logs")
}

pub fn killswitch_state_path(base: &Path) -> PathBuf {
  base.join("killswitch-state.toml")
}

pub fn incidents_dir(base: &Path) -> PathBuf {
  base.join("incidents")
}

pub fn license_state_path(base: &Path) -> PathBuf {
  base.join("license-state.toml")
}

pub fn threat_feed_state_path(base: &Path) -> PathBuf {
  base.join("threat-feed").join("state.toml")
}
