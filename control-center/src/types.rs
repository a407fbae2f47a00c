#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
  Unknown,
  Learning,
  Strict,
}

impl OperatingMode {
  // Values the agent writes to its config; anything unrecognized is Unknown.
  pub fn parse(s: &str) -> Self {
    match s.to_ascii_lowercase().as_str() {
      "learning" => OperatingMode::Learning,
      "strict" => OperatingMode::Strict,
      _ => OperatingMode::Unknown,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      OperatingMode::Unknown => "unknown",
      OperatingMode::Learning => "learning",
      OperatingMode::Strict => "strict",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
  Green,
  Yellow,
  Red,
}

impl Severity {
  pub fn parse(s: &str) -> Option<Self> {
    match s.to_ascii_lowercase().as_str() {
      "green" => Some(Severity::Green),
      "yellow" => Some(Severity::Yellow),
      "red" => Some(Severity::Red),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Severity::Green => "green",
      Severity::Yellow => "yellow",
      Severity::Red => "red",
    }
  }
}

// Service-level liveness of the agent. Transitional covers the pending
// states between stopped and running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentHealth {
  Running,
  Transitional,
  Stopped,
  Unknown,
}

impl AgentHealth {
  pub fn as_str(&self) -> &'static str {
    match self {
      AgentHealth::Running => "running",
      AgentHealth::Transitional => "transitioning",
      AgentHealth::Stopped => "stopped",
      AgentHealth::Unknown => "unknown",
    }
  }
}

pub fn now_unix_ms() -> u64 {
  use std::time::{SystemTime, UNIX_EPOCH};
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as u64
}
