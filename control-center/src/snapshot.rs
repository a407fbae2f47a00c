// One polling instant. A snapshot is built fresh each cycle and superseded
// wholesale by the next; nothing in it is shared or patched in place.

use crate::agent_service;
use crate::agent_state::{
  self, ContainmentState, FeedInfo, IncidentSummary, LicenseInfo, SourceRead,
};
use crate::types::{now_unix_ms, AgentHealth, OperatingMode};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Snapshot {
  pub taken_at_unix_ms: u64,
  pub health: AgentHealth,
  pub mode: OperatingMode,
  pub containment: SourceRead<ContainmentState>,
  pub license: SourceRead<LicenseInfo>,
  pub feed: SourceRead<FeedInfo>,
  pub latest_incident: SourceRead<IncidentSummary>,
}

impl Snapshot {
  pub fn collect(base: &Path) -> Self {
    Snapshot {
      taken_at_unix_ms: now_unix_ms(),
      health: agent_service::probe(),
      mode: agent_state::read_mode(base),
      containment: agent_state::read_containment(base),
      license: agent_state::read_license(base),
      feed: agent_state::read_feed(base),
      latest_incident: agent_state::read_latest_incident(base),
    }
  }

  // Unavailable or malformed containment state reads as not locked; gating
  // never trusts a record that could not be read whole.
  pub fn containment_enabled(&self) -> bool {
    self.containment.ready().map(|c| c.enabled).unwrap_or(false)
  }
}

#[cfg(test)]
impl Snapshot {
  pub fn empty() -> Self {
    Snapshot {
      taken_at_unix_ms: 0,
      health: AgentHealth::Unknown,
      mode: OperatingMode::Unknown,
      containment: SourceRead::Unavailable,
      license: SourceRead::Unavailable,
      feed: SourceRead::Unavailable,
      latest_incident: SourceRead::Unavailable,
    }
  }
}
