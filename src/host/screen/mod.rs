use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::machine::generic::ps2::device::{LedIndicator, Ps2Sender};
use crate::machine::generic::ps2::translate::Status;
use crate::machine::terminal::System;

pub mod headless;

#[cfg(feature = "tui")]
pub mod ratatui;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// The terminal together with the simulated keyboard typing on it.
pub struct Session {
    pub system: System,
    pub sender: Ps2Sender,
    leds: LedIndicator,
    device: JoinHandle<()>,
}

impl Session {
    pub fn new(
        system: System,
        sender: Ps2Sender,
        leds: LedIndicator,
        device: JoinHandle<()>,
    ) -> Self {
        Self {
            system,
            sender,
            leds,
            device,
        }
    }

    /// Runs the terminal once and pushes pending serial output. Returns
    /// whether anything happened.
    pub fn step(&mut self) -> bool {
        let busy = self.system.step();
        self.system.uart.flush();
        busy
    }

    /// Keyboard LEDs and line counters, one line.
    pub fn status_line(&self) -> String {
        let leds = self.leds.get();
        let status = self.system.keyboard.status();
        let stats = self.system.keyboard.stats();
        let flag = |on: bool, name: &'static str| if on { name } else { "----" };
        format!(
            "{} {} {} {}| rx {} tx {} drop {} perr {} nack {} abrt {}",
            flag(leds.is_caps(), "CAPS"),
            flag(leds.is_num(), "NUM "),
            flag(leds.is_scroll(), "SCRL"),
            if status.contains(Status::SHIFT) { "SHF " } else { "" },
            stats.received,
            stats.sent,
            stats.dropped,
            stats.parity_errors,
            stats.missing_acks,
            stats.aborted,
        )
    }

    pub fn dump_screen(&self, path: &Path) -> std::io::Result<()> {
        info!("Dumping LCD to {path:?}");
        std::fs::write(path, self.system.dump_screen_text() + "\n")
    }

    /// Stops the keyboard, handling whatever it had already sent.
    pub fn finish(self) -> System {
        let Self {
            mut system,
            sender,
            device,
            ..
        } = self;
        drop(sender);
        let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
        while !device.is_finished() && Instant::now() < deadline {
            if !system.step() {
                thread::sleep(Duration::from_millis(1));
            }
        }
        system.step();
        system.uart.flush();
        if !system.keyboard.wait_idle(SHUTDOWN_TIMEOUT) {
            warn!("PS2 keyboard stopped with a command outstanding");
        }
        if device.is_finished() {
            if device.join().is_err() {
                warn!("PS2 keyboard thread panicked");
            }
        } else {
            warn!("PS2 keyboard thread still running at exit");
        }
        system
    }
}
