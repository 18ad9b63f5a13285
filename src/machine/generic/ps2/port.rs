//! The host end of the PS/2 link: the clock-edge interrupt and the command
//! sender, sharing frame and queue state through one critical section.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::line::{Edge, FrameEngine, TransferMode};
use super::queue::ScancodeQueue;
use super::wires::HostLines;

/// Clock hold time for request-to-send.
pub const DEFAULT_RTS_HOLD: Duration = Duration::from_micros(120);

/// Frame counters, updated from the interrupt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineStats {
    pub received: u64,
    pub sent: u64,
    /// Bytes discarded because the queue was full.
    pub dropped: u64,
    pub parity_errors: u64,
    pub missing_acks: u64,
    /// Receive frames cut short by a host send.
    pub aborted: u64,
}

#[derive(Debug)]
struct Shared {
    engine: FrameEngine,
    queue: ScancodeQueue,
    stats: LineStats,
}

pub struct Ps2Port {
    lines: Arc<dyn HostLines>,
    shared: Mutex<Shared>,
    /// Signalled whenever a send completes.
    idle: Condvar,
    rts_hold: Duration,
}

impl Ps2Port {
    pub fn new(lines: Arc<dyn HostLines>, queue_size: usize, rts_hold: Duration) -> Self {
        Self {
            lines,
            shared: Mutex::new(Shared {
                engine: FrameEngine::new(),
                queue: ScancodeQueue::new(queue_size),
                stats: LineStats::default(),
            }),
            idle: Condvar::new(),
            rts_hold,
        }
    }

    pub fn lines(&self) -> &Arc<dyn HostLines> {
        &self.lines
    }

    /// Enters the critical section shared with the interrupt.
    fn critical(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Routes the clock interrupt of our lines to this port.
    pub fn attach(self: &Arc<Self>) {
        let port = Arc::downgrade(self);
        self.lines.attach_interrupt(Box::new(move || {
            if let Some(port) = port.upgrade() {
                port.on_clock_edge();
            }
        }));
    }

    /// Drops any frame in progress, queued scancodes and counters.
    pub fn reset(&self) {
        let mut shared = self.critical();
        shared.engine.reset();
        shared.queue.clear();
        shared.stats = LineStats::default();
        self.idle.notify_all();
    }

    /// Clock falling edge interrupt.
    pub fn on_clock_edge(&self) {
        let mut shared = self.critical();
        match shared.engine.clock_edge(self.lines.as_ref()) {
            Edge::Bit => {}
            Edge::Received { byte, parity_ok } => {
                shared.stats.received += 1;
                if !parity_ok {
                    shared.stats.parity_errors += 1;
                    warn!("PS2 parity error on {byte:02X}");
                }
                if !shared.queue.enqueue(byte) {
                    shared.stats.dropped += 1;
                    warn!("PS2 scancode queue full, dropped {byte:02X}");
                }
            }
            Edge::Sent { acked } => {
                shared.stats.sent += 1;
                if !acked {
                    shared.stats.missing_acks += 1;
                    warn!("PS2 keyboard did not acknowledge");
                }
                self.idle.notify_all();
            }
        }
    }

    /// Removes the oldest received scancode.
    pub fn pop_scancode(&self) -> Option<u8> {
        self.critical().queue.dequeue()
    }

    pub fn mode(&self) -> TransferMode {
        self.critical().engine.mode()
    }

    pub fn stats(&self) -> LineStats {
        self.critical().stats
    }

    /// Waits for any send in flight to finish. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut shared = self.critical();
        while shared.engine.mode() == TransferMode::Sending {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            shared = self
                .idle
                .wait_timeout(shared, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Starts sending `byte` to the keyboard once any previous send is done.
    /// Returns after request-to-send; the keyboard clocks the rest of the
    /// frame through the interrupt.
    pub fn send(&self, byte: u8) {
        let mut shared = self.critical();
        while shared.engine.mode() == TransferMode::Sending {
            shared = self
                .idle
                .wait(shared)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(shared);

        debug!("PS2 send {byte:02X}");
        self.lines.inhibit_clock();
        {
            let mut shared = self.critical();
            if shared.engine.abort_receive() {
                shared.stats.aborted += 1;
                warn!("PS2 receive aborted by host send");
            }
            shared.engine.begin_send(byte);
        }
        std::thread::sleep(self.rts_hold);
        self.lines.drive_data(false);
        self.lines.release_clock();
        trace!("PS2 request-to-send complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::generic::ps2::line::frame_bits;
    use crate::machine::generic::ps2::line::tests::FakeLines;
    use crate::machine::generic::ps2::wires::Ps2Wires;

    fn port(queue_size: usize) -> (Arc<FakeLines>, Arc<Ps2Port>) {
        let lines = Arc::new(FakeLines::default());
        let port = Arc::new(Ps2Port::new(lines.clone(), queue_size, Duration::ZERO));
        (lines, port)
    }

    fn clock_in(lines: &FakeLines, port: &Ps2Port, bits: [bool; 11]) {
        for bit in bits {
            lines.set(bit);
            port.on_clock_edge();
        }
    }

    #[test]
    fn test_received_frames_are_queued_in_order() {
        let (lines, port) = port(4);
        for byte in [0x12, 0x1C, 0xF0] {
            clock_in(&lines, &port, frame_bits(byte));
        }
        assert_eq!(port.pop_scancode(), Some(0x12));
        assert_eq!(port.pop_scancode(), Some(0x1C));
        assert_eq!(port.pop_scancode(), Some(0xF0));
        assert_eq!(port.pop_scancode(), None);
        assert_eq!(port.stats().received, 3);
    }

    #[test]
    fn test_overflow_and_parity_are_counted() {
        let (lines, port) = port(1);
        clock_in(&lines, &port, frame_bits(0x1C));
        let mut bad = frame_bits(0x32);
        bad[9] = !bad[9];
        clock_in(&lines, &port, bad);

        let stats = port.stats();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.parity_errors, 1);
        assert_eq!(port.pop_scancode(), Some(0x1C));
        assert_eq!(port.pop_scancode(), None);
    }

    #[test]
    fn test_send_aborts_partial_receive() {
        let (lines, port) = port(4);
        lines.set(false);
        port.on_clock_edge();
        port.on_clock_edge();
        assert_eq!(port.mode(), TransferMode::Receiving);

        port.send(0xEE);
        assert_eq!(port.mode(), TransferMode::Sending);
        assert_eq!(port.stats().aborted, 1);
        // Start bit is held low by the host.
        assert!(!lines.get());

        for _ in 0..10 {
            port.on_clock_edge();
        }
        lines.set(false);
        port.on_clock_edge();
        assert_eq!(port.mode(), TransferMode::Idle);
        assert!(port.wait_idle(Duration::ZERO));
        let stats = port.stats();
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.missing_acks, 0);
        assert_eq!(port.pop_scancode(), None);
    }

    #[test]
    fn test_wait_idle_times_out_without_keyboard() {
        let (_lines, port) = port(4);
        assert!(port.wait_idle(Duration::ZERO));
        port.send(0xF4);
        assert!(!port.wait_idle(Duration::from_millis(5)));
        port.reset();
        assert!(port.wait_idle(Duration::ZERO));
    }

    #[test]
    fn test_attach_routes_wire_edges() {
        let wires = Arc::new(Ps2Wires::new());
        let port = Arc::new(Ps2Port::new(wires.clone(), 4, Duration::ZERO));
        port.attach();
        let epoch = wires.epoch();
        for bit in frame_bits(0x1C) {
            wires.data.device_drive(bit);
            assert!(wires.device_clock_pulse(epoch));
        }
        wires.data.device_drive(true);
        assert_eq!(port.pop_scancode(), Some(0x1C));
        // The interrupt holds the port only weakly.
        assert_eq!(Arc::strong_count(&port), 1);
    }
}
