//! Scancode set 2 to character translation with modifier and lock tracking.

use bitflags::bitflags;
use tracing::{debug, trace};

use super::command::Leds;
use super::keymap::{self, scancodes::*};

bitflags! {
    /// Keyboard status as reported to the application.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Status: u16 {
        const SHIFT = 1 << 0;
        const CTRL = 1 << 1;
        const ALT = 1 << 2;
        /// `E0` seen, waiting for the key.
        const EXTENDED = 1 << 3;
        /// `F0` seen, waiting for the key.
        const BREAK = 1 << 4;
        const CAPS_LOCK = 1 << 5;
        const NUM_LOCK = 1 << 6;
        const SCROLL_LOCK = 1 << 7;
        /// A lock key is down and has already toggled.
        const LOCK_PENDING = 1 << 8;
        const SELF_TEST_PASSED = 1 << 9;
        /// A host-to-keyboard frame is in flight.
        const SENDING = 1 << 10;
    }
}

/// Context the next scancode is read in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Prefix {
    #[default]
    None,
    Extended,
    Break,
    ExtendedBreak,
}

impl Prefix {
    fn with_extended(self) -> Self {
        match self {
            Prefix::Break | Prefix::ExtendedBreak => Prefix::ExtendedBreak,
            Prefix::None | Prefix::Extended => Prefix::Extended,
        }
    }

    fn with_break(self) -> Self {
        match self {
            Prefix::Extended | Prefix::ExtendedBreak => Prefix::ExtendedBreak,
            Prefix::None | Prefix::Break => Prefix::Break,
        }
    }
}

/// Output of a single scancode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translation {
    Char(char),
    /// A lock key toggled; the keyboard's indicators should follow.
    UpdateLeds(Leds),
}

#[derive(Debug, Clone, Default)]
pub struct Translator {
    prefix: Prefix,
    shift: bool,
    ctrl: bool,
    alt: bool,
    locks: Leds,
    lock_pending: bool,
    self_test_passed: bool,
}

impl Translator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn prefix(&self) -> Prefix {
        self.prefix
    }

    pub fn leds(&self) -> Leds {
        self.locks
    }

    /// Overrides the lock state, e.g. when the application sets the LEDs.
    pub fn set_locks(&mut self, locks: Leds) {
        self.locks = locks;
    }

    pub fn status(&self) -> Status {
        let mut status = Status::empty();
        status.set(Status::SHIFT, self.shift);
        status.set(Status::CTRL, self.ctrl);
        status.set(Status::ALT, self.alt);
        status.set(
            Status::EXTENDED,
            matches!(self.prefix, Prefix::Extended | Prefix::ExtendedBreak),
        );
        status.set(
            Status::BREAK,
            matches!(self.prefix, Prefix::Break | Prefix::ExtendedBreak),
        );
        status.set(Status::CAPS_LOCK, self.locks.is_caps());
        status.set(Status::NUM_LOCK, self.locks.is_num());
        status.set(Status::SCROLL_LOCK, self.locks.is_scroll());
        status.set(Status::LOCK_PENDING, self.lock_pending);
        status.set(Status::SELF_TEST_PASSED, self.self_test_passed);
        status
    }

    /// Consumes one scancode.
    pub fn feed(&mut self, scancode: u8) -> Option<Translation> {
        trace!("PS2 scancode {scancode:02X} ({:?})", self.prefix);
        match scancode {
            EXTENDED => {
                self.prefix = self.prefix.with_extended();
                None
            }
            BREAK => {
                self.prefix = self.prefix.with_break();
                None
            }
            SELF_TEST_PASSED => {
                self.self_test_passed = true;
                None
            }
            _ => match std::mem::take(&mut self.prefix) {
                Prefix::Break | Prefix::ExtendedBreak => {
                    self.release(scancode);
                    None
                }
                Prefix::Extended => self.press_extended(scancode),
                Prefix::None => self.press(scancode),
            },
        }
    }

    fn release(&mut self, scancode: u8) {
        match scancode {
            LEFT_SHIFT | RIGHT_SHIFT => self.shift = false,
            CTRL => self.ctrl = false,
            ALT => self.alt = false,
            CAPS_LOCK | NUM_LOCK | SCROLL_LOCK => self.lock_pending = false,
            _ => {}
        }
    }

    fn press_extended(&mut self, scancode: u8) -> Option<Translation> {
        match scancode {
            CTRL => self.ctrl = true,
            ALT => self.alt = true,
            _ => return keymap::extended(scancode).map(|c| Translation::Char(self.fold(c))),
        }
        None
    }

    fn press(&mut self, scancode: u8) -> Option<Translation> {
        match scancode {
            LEFT_SHIFT | RIGHT_SHIFT => self.shift = true,
            CTRL => self.ctrl = true,
            ALT => self.alt = true,
            CAPS_LOCK | NUM_LOCK | SCROLL_LOCK if !self.lock_pending => {
                let (caps, num, scroll) = (
                    self.locks.is_caps() ^ (scancode == CAPS_LOCK),
                    self.locks.is_num() ^ (scancode == NUM_LOCK),
                    self.locks.is_scroll() ^ (scancode == SCROLL_LOCK),
                );
                self.locks = Leds::new(caps, num, scroll);
                self.lock_pending = true;
                debug!("PS2 lock toggled: {:?}", self.locks);
                return Some(Translation::UpdateLeds(self.locks));
            }
            _ => {
                let c = self
                    .shift
                    .then(|| keymap::shifted(scancode))
                    .flatten()
                    .or_else(|| self.locks.is_num().then(|| keymap::numlock(scancode)).flatten())
                    .or_else(|| keymap::normal(scancode))?;
                return Some(Translation::Char(self.fold(c)));
            }
        }
        None
    }

    /// Applies Shift/Caps Lock case folding to a table result. Ctrl and Alt
    /// are tracked in the status only and never change the character.
    fn fold(&self, c: char) -> char {
        if !c.is_ascii_alphabetic() {
            return c;
        }
        if self.shift ^ self.locks.is_caps() {
            c.to_ascii_uppercase()
        } else {
            c.to_ascii_lowercase()
        }
    }
}
