use std::collections::VecDeque;
use std::sync::mpsc::{self, TryRecvError, TrySendError};

use tracing::{trace, warn};

/// Depth of each direction of a [`SerialChannel`] pair.
const CHANNEL_DEPTH: usize = 16;

/// One end of a serial link. The other end is handed to the host side.
pub struct SerialChannel {
    pub rx: mpsc::Receiver<u8>,
    pub tx: mpsc::SyncSender<u8>,
}

impl SerialChannel {
    pub fn new() -> (SerialChannel, SerialChannel) {
        let (tx, rx2) = mpsc::sync_channel(CHANNEL_DEPTH);
        let (tx2, rx) = mpsc::sync_channel(CHANNEL_DEPTH);
        (Self { rx, tx }, Self { rx: rx2, tx: tx2 })
    }
}

/// The terminal's UART. Transmitted bytes are held until the link accepts
/// them so a slow host never stalls the terminal loop.
pub struct Uart {
    channel: SerialChannel,
    tx_pending: VecDeque<u8>,
    disconnected: bool,
}

impl Uart {
    pub fn new() -> (Self, SerialChannel) {
        let (channel, host) = SerialChannel::new();
        (
            Self {
                channel,
                tx_pending: VecDeque::new(),
                disconnected: false,
            },
            host,
        )
    }

    pub fn send_byte(&mut self, c: u8) {
        trace!("UART send {c:02X} {:?}", c as char);
        if !self.disconnected {
            self.tx_pending.push_back(c);
        }
        self.flush();
    }

    pub fn send_bytes(&mut self, bytes: &[u8]) {
        for &c in bytes {
            self.send_byte(c);
        }
    }

    /// Moves held bytes onto the link as far as it has room.
    pub fn flush(&mut self) {
        while let Some(&c) = self.tx_pending.front() {
            match self.channel.tx.try_send(c) {
                Ok(()) => {
                    self.tx_pending.pop_front();
                }
                Err(TrySendError::Full(_)) => break,
                Err(TrySendError::Disconnected(_)) => {
                    self.disconnect();
                    break;
                }
            }
        }
    }

    pub fn tx_pending(&self) -> usize {
        self.tx_pending.len()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    fn disconnect(&mut self) {
        if !self.disconnected {
            warn!("UART host side disconnected");
            self.disconnected = true;
        }
        self.tx_pending.clear();
    }

    /// Returns the next received byte, if one has arrived.
    pub fn receive(&mut self) -> Option<u8> {
        self.flush();
        match self.channel.rx.try_recv() {
            Ok(c) => {
                trace!("UART receive {c:02X} {:?}", c as char);
                Some(c)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.disconnect();
                None
            }
        }
    }
}
