pub mod actions;
pub mod agent_cli;
pub mod agent_service;
pub mod agent_state;
pub mod cli;
pub mod identity;
pub mod instance;
pub mod logging;
pub mod monitor;
pub mod paths;
pub mod runtime;
pub mod snapshot;
pub mod statefile;
pub mod status;
pub mod types;

pub fn run(args: &[String]) -> anyhow::Result<()> {
  let command = cli::parse(args);
  runtime::configure_from_args(args);

  let base = paths::base_dir()?;

  // `--version` and `--help` read nothing and act on nothing, so they may
  // answer even while another instance holds the session guard.
  if !cli::needs_instance_guard(&command) {
    return cli::dispatch(command, &base);
  }

  logging::init(&paths::logs_dir(&base))?;

  let _guard = match instance::acquire()? {
    instance::Acquire::Acquired(guard) => guard,
    instance::Acquire::AlreadyRunning => {
      eprintln!(
        "{} Control Center is already running in this session; exiting.",
        identity::product().name
      );
      std::process::exit(2);
    }
  };

  cli::dispatch(command, &base)
}
