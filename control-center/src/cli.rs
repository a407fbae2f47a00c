// Console surface: hand-parsed argument vector, plain println rendering.
// The logs are never the user surface; everything a user is meant to read
// goes through stdout/stderr here.

use crate::actions::{Action, ActionController, FsState, Outcome, Prompt};
use crate::agent_cli::{AgentCli, CommandRunner, InvokeOutcome, VERSION_ARGS, VERSION_TIMEOUT};
use crate::agent_service::AgentService;
use crate::agent_state::SourceRead;
use crate::identity;
use crate::monitor;
use crate::snapshot::Snapshot;
use crate::status;
use crate::types::now_unix_ms;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
  Status,
  Watch,
  Lock,
  Unlock,
  ToggleMode,
  Version,
  Help,
  Unknown(String),
}

pub fn parse(args: &[String]) -> Command {
  if args.iter().any(|a| a == "--help" || a == "-h") {
    return Command::Help;
  }
  if args.iter().any(|a| a == "--version") {
    return Command::Version;
  }

  for arg in args {
    match arg.as_str() {
      "--status" => return Command::Status,
      "--watch" => return Command::Watch,
      "--lock" => return Command::Lock,
      "--unlock" => return Command::Unlock,
      "--mode" => return Command::ToggleMode,
      "--dry-run" => {}
      other => return Command::Unknown(other.to_string()),
    }
  }

  Command::Help
}

// `--version` and `--help` touch nothing, so a second instance may answer
// them; everything else reads or acts and stays behind the guard.
pub fn needs_instance_guard(command: &Command) -> bool {
  !matches!(command, Command::Version | Command::Help | Command::Unknown(_))
}

pub fn dispatch(command: Command, base: &Path) -> anyhow::Result<()> {
  match command {
    Command::Status => run_status(base),
    Command::Watch => monitor::watch(base),
    Command::Lock => run_action(base, Action::EnableContainment),
    Command::Unlock => run_action(base, Action::DisableContainment),
    Command::ToggleMode => run_action(base, Action::ToggleMode),
    Command::Version => {
      print_version();
      Ok(())
    }
    Command::Help => {
      print_help();
      Ok(())
    }
    Command::Unknown(arg) => {
      eprintln!("Unknown argument `{arg}`.");
      print_help();
      Ok(())
    }
  }
}

pub fn print_version() {
  let product = identity::product();
  println!("{} Control Center v{}", product.name, product.version);
}

pub fn print_help() {
  let product = identity::product();
  println!("{} Control Center v{} (console mode)", product.name, product.version);
  println!("Commands:");
  println!("  --status          show agent status and per-source detail");
  println!("  --watch           refresh the status line every 4s (Ctrl+C to stop)");
  println!("  --lock            enable the network kill switch (asks first)");
  println!("  --unlock          disable the network kill switch (asks first)");
  println!("  --mode            toggle learning/strict mode (asks first)");
  println!("  --dry-run         (global; report actions without side effects)");
  println!("  --version");
  println!("  --help");
}

pub struct ConsolePrompt;

impl Prompt for ConsolePrompt {
  fn confirm(&self, consequence: &str) -> bool {
    dialoguer::Confirm::new()
      .with_prompt(consequence)
      .default(false)
      .interact()
      .unwrap_or(false)
  }
}

fn run_action(base: &Path, action: Action) -> anyhow::Result<()> {
  let runner = AgentCli::discover();
  let state = FsState::new(base.to_path_buf());
  let prompt = ConsolePrompt;
  let service = AgentService;

  let outcome = ActionController::new(&runner, &state, &prompt, &service).run(action);
  match outcome {
    Outcome::Cancelled => {
      println!("Cancelled; nothing changed.");
      Ok(())
    }
    Outcome::DryRun { command } => {
      println!("DRY-RUN: would run `{command}`.");
      Ok(())
    }
    Outcome::Confirmed { detail } => {
      println!("Done: {detail}.");
      Ok(())
    }
    Outcome::Unconfirmed { detail } => {
      // Softer than a failure: the command ran, the effect was not seen.
      println!("WARNING (unconfirmed): {detail}.");
      println!("Re-run `--status` in a moment to see where things landed.");
      Ok(())
    }
    Outcome::Failed { message } => anyhow::bail!("{message}"),
  }
}

fn run_status(base: &Path) -> anyhow::Result<()> {
  let snapshot = Snapshot::collect(base);
  let presented = status::reduce(&snapshot);

  print_version();
  println!("Status: {} [{}]", presented.label, presented.badge.as_str());
  println!();

  println!("Agent service: {}", snapshot.health.as_str());
  print_agent_version();
  println!("Operating mode: {}", snapshot.mode.as_str());
  print_containment(&snapshot);
  print_license(&snapshot);
  print_feed(&snapshot);
  print_incident(&snapshot);
  Ok(())
}

fn print_agent_version() {
  let runner = AgentCli::discover();
  match runner.run(VERSION_ARGS, VERSION_TIMEOUT) {
    InvokeOutcome::Success { stdout } => println!("Agent version: {stdout}"),
    InvokeOutcome::Unavailable => println!("Agent version: unknown (executable not found)"),
    other => println!("Agent version: unknown ({})", other.describe()),
  }
}

fn print_containment(snapshot: &Snapshot) {
  let st = match &snapshot.containment {
    SourceRead::Ready(st) => st,
    SourceRead::Unavailable => {
      println!("Kill switch: unknown (no state file)");
      return;
    }
    SourceRead::Malformed => {
      println!("Kill switch: unknown (state file unreadable)");
      return;
    }
  };

  println!(
    "Kill switch: {}",
    if st.enabled { "ENABLED (network locked)" } else { "DISABLED (network allowed)" }
  );
  if !st.enabled {
    return;
  }

  println!("Keep locked: {}", st.keep_locked);
  if let Some(mode) = st.enabled_mode.as_deref() {
    println!("Lock mode: {mode}");
  }
  match st.failsafe_deadline_unix_ms {
    Some(deadline) => {
      let now = now_unix_ms();
      if deadline > now {
        let remaining_min = (deadline - now).div_ceil(60_000);
        println!("Failsafe: auto-restore in ~{remaining_min} minute(s).");
      } else {
        println!("Failsafe: deadline passed (agent restores on its next reconcile).");
      }
    }
    None => println!("Failsafe: none"),
  }
  if let Some(id) = st.last_incident_id.as_deref() {
    println!("Locked by incident: {id}");
  }
}

fn print_license(snapshot: &Snapshot) {
  let info = match &snapshot.license {
    SourceRead::Ready(info) => info,
    SourceRead::Unavailable => {
      println!("License: unknown (no state file)");
      return;
    }
    SourceRead::Malformed => {
      println!("License: unknown (state file unreadable)");
      return;
    }
  };

  println!("License: {}", info.tier.as_display());
  if let Some(plan) = info.plan.as_deref() {
    println!("Plan: {plan}");
  }
  if let Some(seats) = info.seats {
    println!("Seats: {seats}");
  }
  match info.expires_at_unix_seconds {
    Some(exp) => println!("Expires (unix seconds): {exp}"),
    None => println!("Expires: none"),
  }
  if let Some(reason) = info.reason.as_deref() {
    println!("Note: {reason}");
  }
}

fn print_feed(snapshot: &Snapshot) {
  let info = match &snapshot.feed {
    SourceRead::Ready(info) => info,
    SourceRead::Unavailable => {
      println!("Threat feed: unknown (no state file)");
      return;
    }
    SourceRead::Malformed => {
      println!("Threat feed: unknown (state file unreadable)");
      return;
    }
  };

  if !info.installed {
    println!("Threat feed: not installed");
    return;
  }

  println!(
    "Threat feed: installed{}",
    if info.verified { ", verified" } else { ", NOT verified" }
  );
  if let Some(v) = info.version {
    println!("Rules version: {v}");
  }
  if let Some(result) = info.last_refresh_result.as_deref() {
    println!("Last refresh result: {result}");
  }
}

fn print_incident(snapshot: &Snapshot) {
  let inc = match &snapshot.latest_incident {
    SourceRead::Ready(inc) => inc,
    SourceRead::Unavailable => {
      println!("Last incident: none");
      return;
    }
    SourceRead::Malformed => {
      println!("Last incident: unreadable record");
      return;
    }
  };

  println!(
    "Last incident: {} severity={} created_at_unix_ms={} rules={}",
    inc.id,
    inc.severity.as_str(),
    inc.created_at_unix_ms,
    inc.rule_ids.join(",")
  );
  if !inc.actions.is_empty() {
    println!("Actions taken: {}", inc.actions.join(", "));
  }
}
