// The periodic read-reduce-present loop behind `--watch`. One logical
// thread: each tick rebuilds the snapshot from scratch and prints one line;
// there is no event delivery and no cross-tick state.

use crate::snapshot::Snapshot;
use crate::status;
use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

pub const REFRESH_TICK: Duration = Duration::from_secs(4);

pub fn watch(base: &Path) -> anyhow::Result<()> {
  let (stop_tx, stop_rx) = mpsc::channel::<()>();
  ctrlc::set_handler(move || {
    let _ = stop_tx.send(());
  })?;

  println!(
    "Watching agent status every {}s (Ctrl+C to stop).",
    REFRESH_TICK.as_secs()
  );

  render_tick(base);
  loop {
    if stop_rx.recv_timeout(REFRESH_TICK).is_ok() {
      break;
    }
    render_tick(base);
  }

  println!("Stopped.");
  Ok(())
}

fn render_tick(base: &Path) {
  let snapshot = Snapshot::collect(base);
  let presented = status::reduce(&snapshot);
  println!("{}", render_line(snapshot.taken_at_unix_ms, &presented));
}

fn render_line(taken_at_unix_ms: u64, presented: &status::PresentedStatus) -> String {
  format!(
    "[{}] {:8} {}",
    taken_at_unix_ms,
    presented.badge.as_str(),
    presented.label
  )
}
