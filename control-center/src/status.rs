// Reduces one snapshot to the single presented status. Fixed precedence,
// first match wins: liveness dominates everything (no other fact is
// meaningful if the agent is down), and an enabled kill switch dominates the
// configured mode (a locked network is the operative fact either way).

use crate::snapshot::Snapshot;
use crate::types::{AgentHealth, OperatingMode};

pub const LABEL_MAX_CHARS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Badge {
  Neutral,
  Critical,
  Info,
  Safe,
}

impl Badge {
  pub fn as_str(&self) -> &'static str {
    match self {
      Badge::Neutral => "neutral",
      Badge::Critical => "critical",
      Badge::Info => "info",
      Badge::Safe => "safe",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedStatus {
  pub label: String,
  pub badge: Badge,
}

pub fn reduce(snapshot: &Snapshot) -> PresentedStatus {
  if snapshot.health == AgentHealth::Transitional {
    return presented("Agent Service Restarting", Badge::Neutral);
  }
  if snapshot.health != AgentHealth::Running {
    return presented("Agent Not Running", Badge::Neutral);
  }
  if snapshot.containment_enabled() {
    return presented("Network Locked — Kill Switch Active", Badge::Critical);
  }

  match snapshot.mode {
    OperatingMode::Strict => presented("Strict Mode — Auto Response Enabled", Badge::Info),
    // Unknown renders as the Learning default. Display fallback only: the
    // action-eligibility guard in `actions` makes its own call.
    OperatingMode::Learning | OperatingMode::Unknown => {
      presented("Learning Mode — Monitoring Only", Badge::Safe)
    }
  }
}

fn presented(label: &str, badge: Badge) -> PresentedStatus {
  PresentedStatus { label: cap_label(label), badge }
}

// Host surfaces allot 60 characters for the status line.
pub fn cap_label(label: &str) -> String {
  if label.chars().count() <= LABEL_MAX_CHARS {
    return label.to_string();
  }
  label.chars().take(LABEL_MAX_CHARS).collect()
}
