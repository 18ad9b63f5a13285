use tracing::trace;

use super::wires::HostLines;

/// Frame positions. Device-to-host frames end at [`STOP`]; host-to-device
/// frames carry one more edge for the keyboard's acknowledge.
pub const START: u8 = 0;
pub const PARITY: u8 = 9;
pub const STOP: u8 = 10;
pub const ACK: u8 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    #[default]
    Idle,
    Receiving,
    Sending,
}

/// What a single clock edge produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Mid-frame, nothing to report.
    Bit,
    /// A device-to-host frame completed.
    Received { byte: u8, parity_ok: bool },
    /// A host-to-device frame completed; `acked` is the acknowledge bit as
    /// seen on the data line.
    Sent { acked: bool },
}

/// Odd parity bit for `byte`: set when the data bits hold an even number of ones.
pub fn odd_parity(byte: u8) -> bool {
    byte.count_ones() % 2 == 0
}

/// Line levels of a device-to-host frame, start bit first.
pub fn frame_bits(byte: u8) -> [bool; 11] {
    let mut bits = [false; 11];
    for i in 0..8 {
        bits[1 + i] = byte & (1 << i) != 0;
    }
    bits[PARITY as usize] = odd_parity(byte);
    bits[STOP as usize] = true;
    bits
}

/// Bit-level frame engine. Assembles one 11-bit frame from the keyboard or
/// disassembles one 12-edge frame to it, advancing one bit per clock edge.
#[derive(Debug, Clone, Default)]
pub struct FrameEngine {
    mode: TransferMode,
    position: u8,
    shift: u8,
    ones: u8,
    parity: bool,
}

impl FrameEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    pub fn position(&self) -> u8 {
        self.position
    }

    /// Loads `byte` for transmission. The start bit is the data line the
    /// caller holds low during request-to-send, so the next edge is data bit 0.
    pub fn begin_send(&mut self, byte: u8) {
        self.mode = TransferMode::Sending;
        self.position = 1;
        self.shift = byte;
        self.ones = 0;
    }

    /// Drops a partially assembled receive frame. Returns true if one was
    /// in progress.
    pub fn abort_receive(&mut self) -> bool {
        let was_receiving = self.mode == TransferMode::Receiving;
        if was_receiving {
            self.reset();
        }
        was_receiving
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// The clock-edge interrupt body.
    pub fn clock_edge(&mut self, lines: &dyn HostLines) -> Edge {
        match self.mode {
            TransferMode::Sending => self.send_edge(lines),
            TransferMode::Idle | TransferMode::Receiving => self.receive_edge(lines),
        }
    }

    fn receive_edge(&mut self, lines: &dyn HostLines) -> Edge {
        let bit = lines.read_data();
        match self.position {
            START => {
                self.mode = TransferMode::Receiving;
                self.shift = 0;
                self.ones = 0;
                if bit {
                    trace!("PS2 start bit read high");
                }
            }
            1..=8 => {
                if bit {
                    self.shift |= 1 << (self.position - 1);
                    self.ones += 1;
                }
            }
            PARITY => self.parity = bit,
            _ => {
                let byte = self.shift;
                let parity_ok = (self.ones + self.parity as u8) % 2 == 1;
                trace!("PS2 frame received {byte:02X} (parity ok = {parity_ok}, stop = {bit})");
                self.reset();
                return Edge::Received { byte, parity_ok };
            }
        }
        self.position += 1;
        Edge::Bit
    }

    fn send_edge(&mut self, lines: &dyn HostLines) -> Edge {
        match self.position {
            1..=8 => {
                let bit = self.shift & (1 << (self.position - 1)) != 0;
                if bit {
                    self.ones += 1;
                }
                lines.drive_data(bit);
            }
            PARITY => lines.drive_data(self.ones % 2 == 0),
            STOP => lines.drive_data(true),
            ACK => {
                let acked = !lines.read_data();
                trace!("PS2 frame sent {:02X} (acked = {acked})", self.shift);
                self.reset();
                return Edge::Sent { acked };
            }
            _ => {}
        }
        self.position += 1;
        Edge::Bit
    }
}
