//! PS/2 keyboard interface.
//!
//! The clock-edge interrupt assembles frames from the keyboard into a
//! scancode queue; the foreground polls the queue through the translator.
//! Commands to the keyboard (LEDs and friends) go out through the same
//! frame engine, driven by the keyboard's clock.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

pub mod command;
pub mod device;
pub mod keymap;
pub mod line;
pub mod port;
pub mod queue;
pub mod translate;
pub mod wires;

use command::{Command, Leds};
use line::TransferMode;
use port::{DEFAULT_RTS_HOLD, LineStats, Ps2Port};
use queue::DEFAULT_QUEUE_CAPACITY;
use translate::{Status, Translation, Translator};
use wires::HostLines;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Tunables for [`Ps2Keyboard::new`].
pub struct KeyboardConfig {
    /// Scancodes buffered between the interrupt and [`Ps2Keyboard::poll_char`].
    pub queue_size: usize,
    /// How long the clock is held low before a command is sent.
    pub rts_hold: Duration,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_CAPACITY,
            rts_hold: DEFAULT_RTS_HOLD,
        }
    }
}

/// A PS/2 keyboard on the host's clock and data pins: the port, its clock
/// interrupt and the scancode translator.
pub struct Ps2Keyboard {
    port: Arc<Ps2Port>,
    translator: Translator,
}

impl Ps2Keyboard {
    /// Creates the keyboard on `lines` and runs [`Ps2Keyboard::init`].
    pub fn new(lines: Arc<dyn HostLines>, config: KeyboardConfig) -> Self {
        let port = Arc::new(Ps2Port::new(lines, config.queue_size, config.rts_hold));
        let mut keyboard = Self {
            port,
            translator: Translator::new(),
        };
        keyboard.init();
        keyboard
    }

    /// Attaches the clock interrupt and resets all keyboard state.
    pub fn init(&mut self) {
        self.port.reset();
        self.translator.reset();
        self.port.lines().release_clock();
        self.port.lines().drive_data(true);
        self.port.attach();
        info!("PS2 keyboard initialized");
    }

    /// Returns the next typed character, if any. Never blocks, except to
    /// send an LED update after a lock key.
    pub fn poll_char(&mut self) -> Option<char> {
        while let Some(scancode) = self.port.pop_scancode() {
            match self.translator.feed(scancode) {
                Some(Translation::Char(c)) => return Some(c),
                Some(Translation::UpdateLeds(leds)) => {
                    self.send_command(Command::SetLeds(leds));
                }
                None => {}
            }
        }
        None
    }

    /// Sets the lock state and sends it to the keyboard's indicators.
    /// Returns once the last byte's request-to-send is done; use
    /// [`Ps2Keyboard::wait_idle`] to wait for the keyboard to clock it in.
    pub fn set_leds(&mut self, caps: bool, num: bool, scroll: bool) {
        let leds = Leds::new(caps, num, scroll);
        self.translator.set_locks(leds);
        self.send_command(Command::SetLeds(leds));
    }

    /// The current Caps/Num/Scroll Lock state.
    pub fn leds(&self) -> Leds {
        self.translator.leds()
    }

    /// Modifier, lock and prefix flags, plus [`Status::SENDING`] while a
    /// command byte is in flight.
    pub fn status(&self) -> Status {
        let mut status = self.translator.status();
        status.set(Status::SENDING, self.port.mode() == TransferMode::Sending);
        status
    }

    /// Sends every byte of `command`, each waiting for the previous one.
    /// Replies from the keyboard arrive through the scancode queue.
    pub fn send_command(&self, command: Command) {
        debug!("PS2 command {command:?}");
        for byte in command.to_bytes() {
            self.port.send(byte);
        }
    }

    /// Frame counters since the last [`Ps2Keyboard::init`].
    pub fn stats(&self) -> LineStats {
        self.port.stats()
    }

    /// Waits up to `timeout` for the last command byte to be clocked out.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.port.wait_idle(timeout)
    }
}
