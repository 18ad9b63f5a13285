use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

use super::Session;

/// Runs the terminal without a UI, for `run_for` if given. Stops early once
/// the serial link has gone away and the keyboard is quiet.
pub fn run(session: &mut Session, run_for: Option<Duration>) {
    let start = Instant::now();
    let mut steps = 0_usize;
    loop {
        steps += 1;
        if let Some(run_for) = run_for {
            if start.elapsed() >= run_for {
                break;
            }
        }
        if !session.step() {
            if session.system.uart.is_disconnected() {
                info!("Serial link closed");
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
    info!("Headless run finished after {steps} steps in {:?}", start.elapsed());
}
