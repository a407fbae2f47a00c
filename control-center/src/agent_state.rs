// Typed readers over the agent's state files. Every reader is best-effort:
// a missing source reads as Unavailable, a present-but-broken one as
// Malformed, and no partial record ever escapes.

use crate::paths;
use crate::statefile;
use crate::types::{OperatingMode, Severity};
use anyhow::Context;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRead<T> {
  Ready(T),
  Unavailable,
  Malformed,
}

impl<T> SourceRead<T> {
  pub fn ready(&self) -> Option<&T> {
    match self {
      SourceRead::Ready(v) => Some(v),
      _ => None,
    }
  }
}

// Mirror of the kill switch state the agent persists. When `enabled` is
// false the remaining fields are presentation-only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainmentState {
  pub enabled: bool,
  pub keep_locked: bool,
  pub enabled_mode: Option<String>,
  pub enabled_at_unix_ms: Option<u64>,
  pub failsafe_deadline_unix_ms: Option<u64>,
  pub last_incident_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseTier {
  Community,
  ProActive,
  ProExpired,
  ProInvalid,
}

impl LicenseTier {
  pub fn parse(tag: &str) -> Option<Self> {
    match tag {
      "community" => Some(LicenseTier::Community),
      "pro_active" => Some(LicenseTier::ProActive),
      "pro_expired" => Some(LicenseTier::ProExpired),
      "pro_invalid" => Some(LicenseTier::ProInvalid),
      _ => None,
    }
  }

  pub fn as_display(&self) -> &'static str {
    match self {
      LicenseTier::Community => "Community",
      LicenseTier::ProActive => "Pro (active)",
      LicenseTier::ProExpired => "Pro (expired)",
      LicenseTier::ProInvalid => "Pro (invalid or not activated)",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseInfo {
  pub tier: LicenseTier,
  pub license_id: Option<String>,
  pub plan: Option<String>,
  pub seats: Option<u64>,
  pub expires_at_unix_seconds: Option<u64>,
  pub last_verified_at_unix_seconds: Option<u64>,
  pub checked_at_unix_seconds: u64,
  pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedInfo {
  pub installed: bool,
  pub verified: bool,
  pub version: Option<u64>,
  pub installed_at_unix_ms: Option<u64>,
  pub checked_at_unix_ms: u64,
  pub reason: Option<String>,
  pub created_at_unix_seconds: Option<u64>,
  pub last_verified_at_unix_seconds: Option<u64>,
  pub last_refresh_attempt_at_unix_seconds: Option<u64>,
  pub last_refresh_result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentSummary {
  pub id: String,
  pub severity: Severity,
  pub created_at_unix_ms: u64,
  pub rule_ids: Vec<String>,
  pub actions: Vec<String>,
}

pub fn read_mode(base: &Path) -> OperatingMode {
  let Ok(raw) = fs::read_to_string(paths::config_path(base)) else {
    return OperatingMode::Unknown;
  };
  match statefile::parse(&raw).get_str("mode") {
    Some(tag) => OperatingMode::parse(&tag),
    None => OperatingMode::Unknown,
  }
}

pub fn read_containment(base: &Path) -> SourceRead<ContainmentState> {
  let path = paths::killswitch_state_path(base);
  let raw = match read_source(&path) {
    Some(r) => r,
    None => return SourceRead::Unavailable,
  };

  let fields = statefile::parse(&raw);
  if !fields.contains("enabled") {
    tracing::debug!(path = %path.display(), "kill switch state has no `enabled` key; discarding");
    return SourceRead::Malformed;
  }

  SourceRead::Ready(ContainmentState {
    enabled: fields.get_bool("enabled"),
    keep_locked: fields.get_bool("keep_locked"),
    enabled_mode: fields.get_str("enabled_mode"),
    enabled_at_unix_ms: fields.get_u64("enabled_at_unix_ms"),
    failsafe_deadline_unix_ms: fields.get_u64("failsafe_deadline_unix_ms"),
    last_incident_id: fields.get_str("last_incident_id"),
  })
}

pub fn read_license(base: &Path) -> SourceRead<LicenseInfo> {
  let path = paths::license_state_path(base);
  let raw = match read_source(&path) {
    Some(r) => r,
    None => return SourceRead::Unavailable,
  };

  let fields = statefile::parse(&raw);
  let tier = match fields.get_str("state").as_deref().and_then(LicenseTier::parse) {
    Some(t) => t,
    None => {
      tracing::debug!(path = %path.display(), "license state tag missing or unrecognized; discarding");
      return SourceRead::Malformed;
    }
  };

  SourceRead::Ready(LicenseInfo {
    tier,
    license_id: fields.get_str("license_id"),
    plan: fields.get_str("plan"),
    seats: fields.get_u64("seats"),
    expires_at_unix_seconds: fields.get_u64("expires_at_unix_seconds"),
    last_verified_at_unix_seconds: fields.get_u64("last_verified_at_unix_seconds"),
    checked_at_unix_seconds: fields.get_u64("checked_at_unix_seconds").unwrap_or(0),
    reason: fields.get_str("reason"),
  })
}

pub fn read_feed(base: &Path) -> SourceRead<FeedInfo> {
  let path = paths::threat_feed_state_path(base);
  let raw = match read_source(&path) {
    Some(r) => r,
    None => return SourceRead::Unavailable,
  };

  let fields = statefile::parse(&raw);
  if !fields.contains("installed") {
    tracing::debug!(path = %path.display(), "feed state has no `installed` key; discarding");
    return SourceRead::Malformed;
  }

  SourceRead::Ready(FeedInfo {
    installed: fields.get_bool("installed"),
    verified: fields.get_bool("verified"),
    version: fields.get_u64("version"),
    installed_at_unix_ms: fields.get_u64("installed_at_unix_ms"),
    checked_at_unix_ms: fields.get_u64("checked_at_unix_ms").unwrap_or(0),
    reason: fields.get_str("reason"),
    created_at_unix_seconds: fields.get_u64("created_at_unix_seconds"),
    last_verified_at_unix_seconds: fields.get_u64("last_verified_at_unix_seconds"),
    last_refresh_attempt_at_unix_seconds: fields.get_u64("last_refresh_attempt_at_unix_seconds"),
    last_refresh_result: fields.get_str("last_refresh_result"),
  })
}

// Only the most recently modified incident record is materialized.
pub fn read_latest_incident(base: &Path) -> SourceRead<IncidentSummary> {
  let dir = paths::incidents_dir(base);
  let entries = match fs::read_dir(&dir) {
    Ok(e) => e,
    Err(_) => return SourceRead::Unavailable,
  };

  let mut candidates: Vec<(SystemTime, PathBuf)> = entries
    .flatten()
    .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("toml"))
    .filter_map(|e| {
      let modified = e.metadata().and_then(|m| m.modified()).ok()?;
      Some((modified, e.path()))
    })
    .collect();

  if candidates.is_empty() {
    return SourceRead::Unavailable;
  }

  // Newest first; path order breaks modified-time ties.
  candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
  let newest = &candidates[0].1;

  let raw = match read_source(newest) {
    Some(r) => r,
    None => return SourceRead::Unavailable,
  };
  match parse_incident(&raw) {
    Some(summary) => SourceRead::Ready(summary),
    None => {
      tracing::debug!(path = %newest.display(), "incident record missing id or severity; discarding");
      SourceRead::Malformed
    }
  }
}

// The one write this client performs against agent-owned files.
pub fn write_mode(base: &Path, mode: OperatingMode) -> anyhow::Result<()> {
  let tag = match mode {
    OperatingMode::Learning => "learning",
    OperatingMode::Strict => "strict",
    OperatingMode::Unknown => anyhow::bail!("refusing to persist an unknown mode"),
  };

  let path = paths::config_path(base);
  let current = match fs::read_to_string(&path) {
    Ok(raw) => raw,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
    Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
  };

  let updated = statefile::set_top_level_string(&current, "mode", tag);
  write_atomic(&path, &updated)?;
  tracing::info!(mode = tag, path = %path.display(), "operating mode persisted");
  Ok(())
}

fn read_source(path: &Path) -> Option<String> {
  match fs::read_to_string(path) {
    Ok(raw) => Some(raw),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
    Err(e) => {
      tracing::debug!(path = %path.display(), error = ?e, "state file unreadable");
      None
    }
  }
}

fn parse_incident(raw: &str) -> Option<IncidentSummary> {
  let fields = statefile::parse(raw);
  let id = fields.get_str("incident_id").filter(|s| !s.is_empty())?;
  let severity = Severity::parse(&fields.get_str("severity")?)?;

  let mut rule_ids: BTreeSet<String> = BTreeSet::new();
  for finding in statefile::sections(raw, "findings") {
    if let Some(rule_id) = finding.get_str("rule_id") {
      if !rule_id.is_empty() {
        rule_ids.insert(rule_id);
      }
    }
  }

  Some(IncidentSummary {
    id,
    severity,
    created_at_unix_ms: fields.get_u64("created_at_unix_ms").unwrap_or(0),
    rule_ids: rule_ids.into_iter().collect(),
    actions: fields.get_str_array("actions_taken"),
  })
}

fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
  let parent = path
    .parent()
    .ok_or_else(|| anyhow::anyhow!("file path has no parent: {}", path.display()))?;
  fs::create_dir_all(parent)?;

  let tmp = parent.join(format!(
    ".{}.tmp",
    path.file_name().unwrap_or_default().to_string_lossy()
  ));
  fs::write(&tmp, contents)?;
  fs::rename(&tmp, path)?;
  Ok(())
}
