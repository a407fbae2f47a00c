// Orchestrates the privileged actions. Each run walks Idle → Confirming →
// Invoking → ConfirmingEffect → Settled → Idle; containment actions are
// confirmed against the agent's own state file rather than trusting the
// exit code, and an effect that was never observed settles as Unconfirmed,
// not as success.

use crate::agent_cli::{
  CommandRunner, InvokeOutcome, AGENT_EXE_NAME, COMMAND_TIMEOUT, KILLSWITCH_OFF_ARGS,
  KILLSWITCH_ON_ARGS,
};
use crate::agent_service::ServiceControl;
use crate::agent_state::{self, ContainmentState, SourceRead};
use crate::runtime;
use crate::types::OperatingMode;
use std::path::PathBuf;
use std::time::{Duration, Instant};

pub const EFFECT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const EFFECT_POLL_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  EnableContainment,
  DisableContainment,
  ToggleMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  Idle,
  Confirming,
  Invoking,
  ConfirmingEffect,
  Settled,
}

// Terminal result of one action run. Unconfirmed is deliberately distinct
// from Confirmed and from Failed: the command ran, but its effect was never
// observed, and the user must be told exactly that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
  Cancelled,
  DryRun { command: String },
  Confirmed { detail: String },
  Unconfirmed { detail: String },
  Failed { message: String },
}

// Seam for the confirmation surface; the console implementation lives in
// `cli`, tests script their answers.
pub trait Prompt {
  fn confirm(&self, consequence: &str) -> bool;
}

// Seam over the state files the controller reads and the one key it writes.
pub trait StateSource {
  fn mode(&self) -> OperatingMode;
  fn containment(&self) -> SourceRead<ContainmentState>;
  fn write_mode(&self, mode: OperatingMode) -> anyhow::Result<()>;
}

pub struct FsState {
  base: PathBuf,
}

impl FsState {
  pub fn new(base: PathBuf) -> Self {
    Self { base }
  }
}

impl StateSource for FsState {
  fn mode(&self) -> OperatingMode {
    agent_state::read_mode(&self.base)
  }

  fn containment(&self) -> SourceRead<ContainmentState> {
    agent_state::read_containment(&self.base)
  }

  fn write_mode(&self, mode: OperatingMode) -> anyhow::Result<()> {
    agent_state::write_mode(&self.base, mode)
  }
}

pub struct ActionController<'a> {
  runner: &'a dyn CommandRunner,
  state: &'a dyn StateSource,
  prompt: &'a dyn Prompt,
  service: &'a dyn ServiceControl,
  on_phase: Box<dyn FnMut(Phase) + 'a>,
  // Latched at construction so one run is all-real or all-simulated.
  dry_run: bool,
}

impl<'a> ActionController<'a> {
  pub fn new(
    runner: &'a dyn CommandRunner,
    state: &'a dyn StateSource,
    prompt: &'a dyn Prompt,
    service: &'a dyn ServiceControl,
  ) -> Self {
    Self {
      runner,
      state,
      prompt,
      service,
      on_phase: Box::new(|_| {}),
      dry_run: runtime::is_dry_run(),
    }
  }

  // Presentation code subscribes here; the controller never knows the UI.
  pub fn on_phase(mut self, observer: impl FnMut(Phase) + 'a) -> Self {
    self.on_phase = Box::new(observer);
    self
  }

  pub fn dry_run(mut self, enabled: bool) -> Self {
    self.dry_run = enabled;
    self
  }

  pub fn run(&mut self, action: Action) -> Outcome {
    let outcome = match action {
      Action::EnableContainment => self.run_containment(true),
      Action::DisableContainment => self.run_containment(false),
      Action::ToggleMode => self.run_mode_toggle(),
    };
    tracing::info!(?action, ?outcome, "action settled");
    self.enter(Phase::Idle);
    outcome
  }

  fn run_containment(&mut self, enable: bool) -> Outcome {
    let (args, consequence) = if enable {
      (
        KILLSWITCH_ON_ARGS,
        "Enable the network kill switch? ALL inbound and outbound traffic will be blocked.",
      )
    } else {
      (
        KILLSWITCH_OFF_ARGS,
        "Disable the network kill switch? Networking will be restored.",
      )
    };

    self.enter(Phase::Confirming);
    if !self.prompt.confirm(consequence) {
      return Outcome::Cancelled;
    }

    if self.dry_run {
      return Outcome::DryRun { command: render_command(args) };
    }

    self.enter(Phase::Invoking);
    let invoked = self.runner.run(args, COMMAND_TIMEOUT);
    if !matches!(invoked, InvokeOutcome::Success { .. }) {
      self.enter(Phase::Settled);
      return Outcome::Failed { message: invoked.describe() };
    }

    self.enter(Phase::ConfirmingEffect);
    let converged = self.wait_for_containment(enable);
    self.enter(Phase::Settled);

    if converged {
      let detail = if enable {
        "kill switch is ON; the network is locked".to_string()
      } else {
        "kill switch is OFF; the network is restored".to_string()
      };
      Outcome::Confirmed { detail }
    } else {
      Outcome::Unconfirmed {
        detail: format!(
          "the agent accepted the command, but the kill switch state did not read `enabled = {enable}` within {}s; it may still apply with delayed file visibility",
          EFFECT_POLL_WINDOW.as_secs()
        ),
      }
    }
  }

  // Samples the agent-owned state file until `enabled` matches or the
  // window expires. Unavailable and malformed reads never count as a match.
  fn wait_for_containment(&self, expected: bool) -> bool {
    let deadline = Instant::now() + EFFECT_POLL_WINDOW;
    loop {
      if let SourceRead::Ready(st) = self.state.containment() {
        if st.enabled == expected {
          return true;
        }
      }
      if Instant::now() >= deadline {
        return false;
      }
      std::thread::sleep(EFFECT_POLL_INTERVAL);
    }
  }

  fn run_mode_toggle(&mut self) -> Outcome {
    // Eligibility guard, independent of the display fallback: a toggle from
    // an unknown mode could flip the agent somewhere the user never chose.
    let current = self.state.mode();
    let target = match current {
      OperatingMode::Learning => OperatingMode::Strict,
      OperatingMode::Strict => OperatingMode::Learning,
      OperatingMode::Unknown => {
        return Outcome::Failed {
          message: "current operating mode is unknown; repair the agent's config.toml before toggling".to_string(),
        };
      }
    };

    self.enter(Phase::Confirming);
    let consequence = format!(
      "Switch the operating mode from {} to {}?",
      current.as_str(),
      target.as_str()
    );
    if !self.prompt.confirm(&consequence) {
      return Outcome::Cancelled;
    }

    if self.dry_run {
      return Outcome::DryRun {
        command: format!("set mode = \"{}\" in the agent's config.toml", target.as_str()),
      };
    }

    self.enter(Phase::Invoking);
    if let Err(e) = self.state.write_mode(target) {
      self.enter(Phase::Settled);
      return Outcome::Failed { message: format!("could not persist the new mode: {e:#}") };
    }

    // The write is already durable; a restart only shortens the wait until
    // the agent picks it up. Its failure is reported, never escalated.
    let mut detail = format!("operating mode is now {}", target.as_str());
    if self
      .prompt
      .confirm("Restart the agent service now so the new mode applies immediately?")
    {
      match self.service.restart() {
        Ok(()) => detail.push_str("; agent service restarted"),
        Err(e) => {
          tracing::warn!(error = %e, "service restart after mode toggle failed");
          detail.push_str(&format!(
            "; service restart failed ({e:#}) — the new mode applies on the next agent start"
          ));
        }
      }
    } else {
      detail.push_str("; it applies on the next agent service start");
    }

    self.enter(Phase::Settled);
    Outcome::Confirmed { detail }
  }

  fn enter(&mut self, phase: Phase) {
    tracing::debug!(?phase, "action phase");
    (self.on_phase)(phase);
  }
}

fn render_command(args: &[&str]) -> String {
  format!("{} {}", AGENT_EXE_NAME, args.join(" "))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::{Cell, RefCell};
  use std::collections::VecDeque;

  struct FakeRunner {
    outcome: InvokeOutcome,
    calls: RefCell<Vec<Vec<String>>>,
  }

  impl FakeRunner {
    fn succeeding() -> Self {
      Self {
        outcome: InvokeOutcome::Success { stdout: String::new() },
        calls: RefCell::new(Vec::new()),
      }
    }

    fn failing(message: &str) -> Self {
      Self {
        outcome: InvokeOutcome::NonZeroExit { code: Some(1), message: message.to_string() },
        calls: RefCell::new(Vec::new()),
      }
    }

    fn call_count(&self) -> usize {
      self.calls.borrow().len()
    }
  }

  impl CommandRunner for FakeRunner {
    fn run(&self, args: &[&str], _timeout: Duration) -> InvokeOutcome {
      self.calls.borrow_mut().push(args.iter().map(|s| s.to_string()).collect());
      self.outcome.clone()
    }
  }

  // Containment flips to `target` once `flip_after` has elapsed; None never
  // flips. Mode writes are recorded instead of touching any file.
  struct FakeState {
    mode: Cell<OperatingMode>,
    initial_enabled: bool,
    target_enabled: bool,
    flip_after: Option<Duration>,
    started: Instant,
    written_modes: RefCell<Vec<OperatingMode>>,
    fail_write: bool,
  }

  impl FakeState {
    fn flipping(initial: bool, target: bool, after: Duration) -> Self {
      Self {
        mode: Cell::new(OperatingMode::Learning),
        initial_enabled: initial,
        target_enabled: target,
        flip_after: Some(after),
        started: Instant::now(),
        written_modes: RefCell::new(Vec::new()),
        fail_write: false,
      }
    }

    fn stuck(enabled: bool) -> Self {
      Self {
        mode: Cell::new(OperatingMode::Learning),
        initial_enabled: enabled,
        target_enabled: enabled,
        flip_after: None,
        started: Instant::now(),
        written_modes: RefCell::new(Vec::new()),
        fail_write: false,
      }
    }

    fn with_mode(mode: OperatingMode) -> Self {
      let state = Self::stuck(false);
      state.mode.set(mode);
      state
    }
  }

  impl StateSource for FakeState {
    fn mode(&self) -> OperatingMode {
      self.mode.get()
    }

    fn containment(&self) -> SourceRead<ContainmentState> {
      let enabled = match self.flip_after {
        Some(after) if self.started.elapsed() >= after => self.target_enabled,
        _ => self.initial_enabled,
      };
      SourceRead::Ready(ContainmentState { enabled, ..Default::default() })
    }

    fn write_mode(&self, mode: OperatingMode) -> anyhow::Result<()> {
      if self.fail_write {
        anyhow::bail!("disk full");
      }
      self.written_modes.borrow_mut().push(mode);
      self.mode.set(mode);
      Ok(())
    }
  }

  struct ScriptedPrompt {
    answers: RefCell<VecDeque<bool>>,
    asked: RefCell<Vec<String>>,
  }

  impl ScriptedPrompt {
    fn new(answers: &[bool]) -> Self {
      Self {
        answers: RefCell::new(answers.iter().copied().collect()),
        asked: RefCell::new(Vec::new()),
      }
    }
  }

  impl Prompt for ScriptedPrompt {
    fn confirm(&self, consequence: &str) -> bool {
      self.asked.borrow_mut().push(consequence.to_string());
      self.answers.borrow_mut().pop_front().unwrap_or(false)
    }
  }

  struct FakeService {
    fail: bool,
    restarts: Cell<usize>,
  }

  impl FakeService {
    fn working() -> Self {
      Self { fail: false, restarts: Cell::new(0) }
    }

    fn broken() -> Self {
      Self { fail: true, restarts: Cell::new(0) }
    }
  }

  impl ServiceControl for FakeService {
    fn restart(&self) -> anyhow::Result<()> {
      self.restarts.set(self.restarts.get() + 1);
      if self.fail {
        anyhow::bail!("access denied");
      }
      Ok(())
    }
  }

  #[test]
  fn enable_confirms_when_state_flips_within_the_window() {
    let runner = FakeRunner::succeeding();
    let state = FakeState::flipping(false, true, Duration::from_millis(300));
    let prompt = ScriptedPrompt::new(&[true]);
    let service = FakeService::working();

    let started = Instant::now();
    let outcome =
      ActionController::new(&runner, &state, &prompt, &service).run(Action::EnableContainment);
    let elapsed = started.elapsed();

    assert!(matches!(outcome, Outcome::Confirmed { .. }), "got {outcome:?}");
    assert!(elapsed < EFFECT_POLL_WINDOW, "confirmation was not prompt: {elapsed:?}");
    assert_eq!(runner.calls.borrow()[0], KILLSWITCH_ON_ARGS);
  }

  #[test]
  fn enable_settles_unconfirmed_at_the_window_when_state_never_flips() {
    let runner = FakeRunner::succeeding();
    let state = FakeState::stuck(false);
    let prompt = ScriptedPrompt::new(&[true]);
    let service = FakeService::working();

    let started = Instant::now();
    let outcome =
      ActionController::new(&runner, &state, &prompt, &service).run(Action::EnableContainment);
    let elapsed = started.elapsed();

    assert!(matches!(outcome, Outcome::Unconfirmed { .. }), "got {outcome:?}");
    assert!(elapsed >= EFFECT_POLL_WINDOW, "settled too early: {elapsed:?}");
    assert!(elapsed < EFFECT_POLL_WINDOW + Duration::from_secs(1), "settled too late: {elapsed:?}");
  }

  #[test]
  fn disable_waits_for_enabled_false() {
    let runner = FakeRunner::succeeding();
    let state = FakeState::flipping(true, false, Duration::from_millis(100));
    let prompt = ScriptedPrompt::new(&[true]);
    let service = FakeService::working();

    let outcome =
      ActionController::new(&runner, &state, &prompt, &service).run(Action::DisableContainment);
    assert!(matches!(outcome, Outcome::Confirmed { .. }), "got {outcome:?}");
    assert_eq!(runner.calls.borrow()[0], KILLSWITCH_OFF_ARGS);
  }

  #[test]
  fn declined_confirmation_cancels_without_invoking() {
    let runner = FakeRunner::succeeding();
    let state = FakeState::stuck(false);
    let prompt = ScriptedPrompt::new(&[false]);
    let service = FakeService::working();

    let outcome =
      ActionController::new(&runner, &state, &prompt, &service).run(Action::EnableContainment);
    assert_eq!(outcome, Outcome::Cancelled);
    assert_eq!(runner.call_count(), 0);
  }

  #[test]
  fn invoker_failure_short_circuits_without_effect_polling() {
    let runner = FakeRunner::failing("firewall backend unavailable");
    let state = FakeState::stuck(false);
    let prompt = ScriptedPrompt::new(&[true]);
    let service = FakeService::working();

    let phases = RefCell::new(Vec::new());
    let outcome = ActionController::new(&runner, &state, &prompt, &service)
      .on_phase(|p| phases.borrow_mut().push(p))
      .run(Action::EnableContainment);

    match outcome {
      Outcome::Failed { message } => assert!(message.contains("firewall backend unavailable")),
      other => panic!("expected failed, got {other:?}"),
    }
    assert!(!phases.borrow().contains(&Phase::ConfirmingEffect));
  }

  #[test]
  fn phases_walk_the_machine_in_order() {
    let runner = FakeRunner::succeeding();
    let state = FakeState::flipping(false, true, Duration::from_millis(0));
    let prompt = ScriptedPrompt::new(&[true]);
    let service = FakeService::working();

    let phases = RefCell::new(Vec::new());
    ActionController::new(&runner, &state, &prompt, &service)
      .on_phase(|p| phases.borrow_mut().push(p))
      .run(Action::EnableContainment);

    assert_eq!(
      *phases.borrow(),
      vec![
        Phase::Confirming,
        Phase::Invoking,
        Phase::ConfirmingEffect,
        Phase::Settled,
        Phase::Idle
      ]
    );
  }

  #[test]
  fn mode_toggle_flips_and_persists() {
    let runner = FakeRunner::succeeding();
    let state = FakeState::with_mode(OperatingMode::Learning);
    let prompt = ScriptedPrompt::new(&[true, false]);
    let service = FakeService::working();

    let outcome =
      ActionController::new(&runner, &state, &prompt, &service).run(Action::ToggleMode);

    match outcome {
      Outcome::Confirmed { detail } => assert!(detail.contains("strict")),
      other => panic!("expected confirmed, got {other:?}"),
    }
    assert_eq!(*state.written_modes.borrow(), vec![OperatingMode::Strict]);
    // Restart declined, so the service was never touched.
    assert_eq!(service.restarts.get(), 0);
    // No agent command is involved in a mode toggle.
    assert_eq!(runner.call_count(), 0);
  }

  #[test]
  fn mode_toggle_refuses_unknown_mode_before_prompting() {
    let runner = FakeRunner::succeeding();
    let state = FakeState::with_mode(OperatingMode::Unknown);
    let prompt = ScriptedPrompt::new(&[true, true]);
    let service = FakeService::working();

    let outcome =
      ActionController::new(&runner, &state, &prompt, &service).run(Action::ToggleMode);

    assert!(matches!(outcome, Outcome::Failed { .. }), "got {outcome:?}");
    assert!(prompt.asked.borrow().is_empty());
    assert!(state.written_modes.borrow().is_empty());
  }

  #[test]
  fn failed_restart_after_toggle_stays_confirmed() {
    let runner = FakeRunner::succeeding();
    let state = FakeState::with_mode(OperatingMode::Strict);
    let prompt = ScriptedPrompt::new(&[true, true]);
    let service = FakeService::broken();

    let outcome =
      ActionController::new(&runner, &state, &prompt, &service).run(Action::ToggleMode);

    match outcome {
      Outcome::Confirmed { detail } => {
        assert!(detail.contains("restart failed"));
        assert!(detail.contains("next agent start"));
      }
      other => panic!("expected confirmed, got {other:?}"),
    }
    assert_eq!(service.restarts.get(), 1);
    assert_eq!(*state.written_modes.borrow(), vec![OperatingMode::Learning]);
  }

  #[test]
  fn failed_mode_write_is_an_action_failure() {
    let runner = FakeRunner::succeeding();
    let mut state = FakeState::with_mode(OperatingMode::Learning);
    state.fail_write = true;
    let prompt = ScriptedPrompt::new(&[true]);
    let service = FakeService::working();

    let outcome =
      ActionController::new(&runner, &state, &prompt, &service).run(Action::ToggleMode);
    assert!(matches!(outcome, Outcome::Failed { .. }), "got {outcome:?}");
  }

  #[test]
  fn dry_run_reports_the_command_without_side_effects() {
    let runner = FakeRunner::succeeding();
    let state = FakeState::stuck(false);
    let prompt = ScriptedPrompt::new(&[true]);
    let service = FakeService::working();

    let outcome = ActionController::new(&runner, &state, &prompt, &service)
      .dry_run(true)
      .run(Action::EnableContainment);

    match outcome {
      Outcome::DryRun { command } => {
        assert!(command.contains("--killswitch on"), "got {command}");
      }
      other => panic!("expected dry-run, got {other:?}"),
    }
    assert_eq!(runner.call_count(), 0);
  }
}
