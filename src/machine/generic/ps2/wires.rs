//! Open-drain model of the PS/2 clock and data lines.
//!
//! Both lines have pull-ups, so each one reads high unless the host or the
//! keyboard pulls it low. A falling edge on the clock raises the interrupt
//! attached through [`HostLines::attach_interrupt`], synchronously, on the
//! thread that produced the edge.

use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::trace;

const HOST: u8 = 0b01;
const DEVICE: u8 = 0b10;

pub type Interrupt = Box<dyn Fn() + Send + Sync>;

/// One open-drain line. Either side may pull it low; it floats high otherwise.
#[derive(Debug, Default)]
pub struct OpenDrain {
    pulled: AtomicU8,
}

impl OpenDrain {
    pub fn is_high(&self) -> bool {
        self.pulled.load(Ordering::Acquire) == 0
    }

    pub fn held_by_host(&self) -> bool {
        self.pulled.load(Ordering::Acquire) & HOST != 0
    }

    pub fn held_by_device(&self) -> bool {
        self.pulled.load(Ordering::Acquire) & DEVICE != 0
    }

    /// Returns true if this pull produced a falling edge.
    fn pull(&self, side: u8) -> bool {
        self.pulled.fetch_or(side, Ordering::AcqRel) == 0
    }

    fn release(&self, side: u8) {
        self.pulled.fetch_and(!side, Ordering::AcqRel);
    }

    pub fn host_drive(&self, high: bool) {
        if high {
            self.release(HOST);
        } else {
            self.pull(HOST);
        }
    }

    pub fn device_drive(&self, high: bool) {
        if high {
            self.release(DEVICE);
        } else {
            self.pull(DEVICE);
        }
    }
}

/// The host's view of the two lines: what the frame engine samples and
/// drives, and what the command sender needs for request-to-send.
pub trait HostLines: Send + Sync {
    fn read_data(&self) -> bool;
    /// `true` releases the line, `false` pulls it low.
    fn drive_data(&self, high: bool);
    /// Holds the clock low. Returns once no device edge is in flight.
    fn inhibit_clock(&self);
    fn release_clock(&self);
    /// Routes clock falling edges to `handler`, replacing any previous one.
    fn attach_interrupt(&self, handler: Interrupt);
}

#[derive(Default)]
pub struct Ps2Wires {
    pub clock: OpenDrain,
    pub data: OpenDrain,
    /// Held for the whole of a device clock pulse, interrupt included.
    edge: Mutex<Option<Interrupt>>,
    /// Bumped every time the host inhibits the clock.
    epoch: AtomicU32,
}

impl Ps2Wires {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the host has inhibited the clock so far.
    pub fn epoch(&self) -> u32 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Device side: pulse the clock low and back high. The attached
    /// interrupt runs on the falling edge. Returns false, without producing
    /// an edge, while the host inhibits the clock or if it has done so since
    /// `epoch` was read.
    pub fn device_clock_pulse(&self, epoch: u32) -> bool {
        let handler = self.edge.lock().unwrap_or_else(PoisonError::into_inner);
        if self.clock.held_by_host() || self.epoch() != epoch {
            return false;
        }
        if self.clock.pull(DEVICE) {
            if let Some(handler) = handler.as_ref() {
                handler();
            }
        }
        self.clock.release(DEVICE);
        true
    }

    /// Device side: the host has finished request-to-send and is waiting
    /// for the keyboard to clock the frame in.
    pub fn host_requesting_send(&self) -> bool {
        self.data.held_by_host() && self.clock.is_high()
    }
}

impl HostLines for Ps2Wires {
    fn read_data(&self) -> bool {
        self.data.is_high()
    }

    fn drive_data(&self, high: bool) {
        self.data.host_drive(high);
    }

    fn inhibit_clock(&self) {
        let _edge = self.edge.lock().unwrap_or_else(PoisonError::into_inner);
        self.clock.host_drive(false);
        self.epoch.fetch_add(1, Ordering::AcqRel);
        trace!("PS2 clock inhibited by host");
    }

    fn release_clock(&self) {
        self.clock.host_drive(true);
        trace!("PS2 clock released by host");
    }

    fn attach_interrupt(&self, handler: Interrupt) {
        *self.edge.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }
}
