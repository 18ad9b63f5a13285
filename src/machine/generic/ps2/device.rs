//! A simulated PS/2 keyboard on the far end of the wires.
//!
//! Key events arrive as scancodes through a [`Ps2Sender`] and are clocked
//! onto the wires one frame at a time. Commands from the host are clocked in
//! whenever the host requests to send, and answered like an MF2 keyboard.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use super::command::{Command, Leds, Response};
use super::keymap::{self, scancodes};
use super::line::frame_bits;
use super::wires::Ps2Wires;

/// Half a clock period at ~12kHz.
pub const DEFAULT_BIT_TIME: Duration = Duration::from_micros(40);

const POLL_INTERVAL: Duration = Duration::from_millis(1);
/// How long the keyboard keeps answering the host after the last sender is
/// dropped, so a lock key's LED update can still complete.
const LINGER: Duration = Duration::from_millis(100);

/// LED register of the keyboard, as last set by the host.
#[derive(Debug, Clone, Default)]
pub struct LedIndicator(Arc<AtomicU8>);

impl LedIndicator {
    pub fn get(&self) -> Leds {
        Leds::from_byte(self.0.load(Ordering::Acquire))
    }

    fn set(&self, leds: Leds) {
        self.0.store(leds.byte(), Ordering::Release);
    }
}

/// Outcome of clocking in one host-to-device frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostFrame {
    Byte(u8),
    /// Bad parity or stop bit.
    Corrupt(u8),
    /// The host took the clock back mid-frame.
    Inhibited,
}

pub struct Ps2Device {
    wires: Arc<Ps2Wires>,
    recv: mpsc::Receiver<u8>,
    outgoing: VecDeque<u8>,
    incoming: VecDeque<u8>,
    leds: LedIndicator,
    scanning: bool,
    last_sent: u8,
    bit_time: Duration,
}

impl Ps2Device {
    /// Creates a powered-up keyboard with its self-test result queued, and
    /// the first handle for typing on it.
    pub fn new(wires: Arc<Ps2Wires>) -> (Self, Ps2Sender) {
        let (send, recv) = mpsc::channel();
        let device = Self {
            wires,
            recv,
            outgoing: VecDeque::from(Response::SelfTestPassed.to_bytes()),
            incoming: VecDeque::new(),
            leds: LedIndicator::default(),
            scanning: true,
            last_sent: 0,
            bit_time: DEFAULT_BIT_TIME,
        };
        (device, Ps2Sender { send })
    }

    pub fn with_bit_time(mut self, bit_time: Duration) -> Self {
        self.bit_time = bit_time;
        self
    }

    pub fn leds(&self) -> LedIndicator {
        self.leds.clone()
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("ps2-keyboard".into())
            .spawn(move || self.run())
    }

    /// Runs until every sender is gone, nothing is left to transmit and the
    /// host has been quiet for a while.
    pub fn run(mut self) {
        info!("PS2 keyboard running");
        let mut hung_up: Option<Instant> = None;
        loop {
            if self.wires.host_requesting_send() {
                let frame = self.receive();
                self.handle_frame(frame);
                hung_up = hung_up.map(|_| Instant::now());
                continue;
            }

            if let Some(&byte) = self.outgoing.front() {
                if self.transmit(byte) {
                    self.outgoing.pop_front();
                    self.last_sent = byte;
                } else {
                    trace!("PS2 keyboard transmit of {byte:02X} inhibited");
                    thread::yield_now();
                }
                continue;
            }

            if let Some(since) = hung_up {
                if since.elapsed() >= LINGER {
                    break;
                }
                thread::sleep(POLL_INTERVAL);
                continue;
            }

            match self.recv.recv_timeout(POLL_INTERVAL) {
                Ok(scancode) => self.accept(scancode),
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => hung_up = Some(Instant::now()),
            }
        }
        info!("PS2 keyboard stopped");
    }

    fn accept(&mut self, scancode: u8) {
        if self.scanning {
            self.outgoing.push_back(scancode);
        } else {
            trace!("PS2 keyboard scanning disabled, discarding {scancode:02X}");
        }
        while let Ok(scancode) = self.recv.try_recv() {
            if self.scanning {
                self.outgoing.push_back(scancode);
            }
        }
    }

    fn pause(&self) {
        if !self.bit_time.is_zero() {
            thread::sleep(self.bit_time);
        }
    }

    /// Clocks one frame to the host. Returns false if the host inhibited
    /// the clock before the stop bit.
    fn transmit(&self, byte: u8) -> bool {
        let epoch = self.wires.epoch();
        for bit in frame_bits(byte) {
            self.wires.data.device_drive(bit);
            self.pause();
            if !self.wires.device_clock_pulse(epoch) {
                self.wires.data.device_drive(true);
                return false;
            }
        }
        self.wires.data.device_drive(true);
        self.pause();
        true
    }

    /// Clocks in one frame after the host's request-to-send. The host sets
    /// up each bit on the falling edge and it is sampled after the rising one.
    fn receive(&self) -> HostFrame {
        let epoch = self.wires.epoch();
        let sample = || {
            self.pause();
            if !self.wires.device_clock_pulse(epoch) {
                return None;
            }
            Some(self.wires.data.is_high())
        };

        let mut byte = 0;
        let mut ones = 0;
        for i in 0..8 {
            let Some(bit) = sample() else {
                return HostFrame::Inhibited;
            };
            if bit {
                byte |= 1 << i;
                ones += 1;
            }
        }
        let (Some(parity), Some(stop)) = (sample(), sample()) else {
            return HostFrame::Inhibited;
        };

        self.wires.data.device_drive(false);
        self.pause();
        self.wires.device_clock_pulse(epoch);
        self.wires.data.device_drive(true);

        if (ones + parity as u8) % 2 == 1 && stop {
            HostFrame::Byte(byte)
        } else {
            HostFrame::Corrupt(byte)
        }
    }

    /// Queues `bytes` ahead of any pending scancodes.
    fn respond(&mut self, bytes: &[u8]) {
        for &byte in bytes.iter().rev() {
            self.outgoing.push_front(byte);
        }
    }

    fn handle_frame(&mut self, frame: HostFrame) {
        let byte = match frame {
            HostFrame::Byte(byte) => byte,
            HostFrame::Corrupt(byte) => {
                warn!("PS2 keyboard received corrupt frame {byte:02X}");
                self.respond(&Response::Resend.to_bytes());
                return;
            }
            HostFrame::Inhibited => return,
        };

        self.incoming.push_back(byte);
        let Ok(command) = Command::try_from(&self.incoming) else {
            // Parameter still to come.
            self.respond(&Response::Ack.to_bytes());
            return;
        };
        self.incoming.clear();
        debug!("PS2 keyboard command {command:?}");

        match command {
            Command::SetLeds(leds) => self.leds.set(leds),
            Command::EnableScanning => self.scanning = true,
            Command::DisableScanning => {
                self.scanning = false;
                self.outgoing.clear();
            }
            Command::SetDefaults => self.scanning = true,
            Command::Reset => {
                self.outgoing.clear();
                self.leds.set(Leds::default());
                self.scanning = true;
            }
            Command::Resend => {
                let last_sent = self.last_sent;
                self.respond(&[last_sent]);
            }
            Command::Echo
            | Command::Identify
            | Command::SetTypematic(_)
            | Command::Unknown(_) => {}
        }

        let response: Vec<u8> = command
            .response()
            .iter()
            .flat_map(Response::to_bytes)
            .collect();
        trace!("PS2 keyboard response {:02X?}", response);
        self.respond(&response);
    }
}

/// Keys typed by name rather than by character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKey {
    LeftShift,
    RightShift,
    LeftCtrl,
    RightCtrl,
    LeftAlt,
    RightAlt,
    CapsLock,
    NumLock,
    ScrollLock,
    Escape,
    Backspace,
    Tab,
    Enter,
    Up,
    Down,
    Left,
    Right,
    Delete,
    KpEnter,
    KpSlash,
    Kp0,
    Kp1,
    Kp2,
    Kp3,
    Kp4,
    Kp5,
    Kp6,
    Kp7,
    Kp8,
    Kp9,
    KpPeriod,
    KpPlus,
    KpMinus,
    KpStar,
}

impl SpecialKey {
    /// Whether the key is `E0`-prefixed, and its scancode.
    pub fn scancode(self) -> (bool, u8) {
        use SpecialKey::*;
        match self {
            LeftShift => (false, scancodes::LEFT_SHIFT),
            RightShift => (false, scancodes::RIGHT_SHIFT),
            LeftCtrl => (false, scancodes::CTRL),
            RightCtrl => (true, scancodes::CTRL),
            LeftAlt => (false, scancodes::ALT),
            RightAlt => (true, scancodes::ALT),
            CapsLock => (false, scancodes::CAPS_LOCK),
            NumLock => (false, scancodes::NUM_LOCK),
            ScrollLock => (false, scancodes::SCROLL_LOCK),
            Escape => (false, 0x76),
            Backspace => (false, 0x66),
            Tab => (false, 0x0D),
            Enter => (false, 0x5A),
            Up => (true, 0x75),
            Down => (true, 0x72),
            Left => (true, 0x6B),
            Right => (true, 0x74),
            Delete => (true, 0x71),
            KpEnter => (true, 0x5A),
            KpSlash => (true, 0x4A),
            Kp0 => (false, 0x70),
            Kp1 => (false, 0x69),
            Kp2 => (false, 0x72),
            Kp3 => (false, 0x7A),
            Kp4 => (false, 0x6B),
            Kp5 => (false, 0x73),
            Kp6 => (false, 0x74),
            Kp7 => (false, 0x6C),
            Kp8 => (false, 0x75),
            Kp9 => (false, 0x7D),
            KpPeriod => (false, 0x71),
            KpPlus => (false, 0x79),
            KpMinus => (false, 0x7B),
            KpStar => (false, 0x7C),
        }
    }
}

/// Types on a [`Ps2Device`]. Sends are ignored once the device has stopped.
#[derive(Clone)]
pub struct Ps2Sender {
    send: mpsc::Sender<u8>,
}

impl Ps2Sender {
    pub fn send_scancodes(&self, scancodes: &[u8]) {
        for &scancode in scancodes {
            _ = self.send.send(scancode);
        }
    }

    fn make(&self, extended: bool, scancode: u8) {
        if extended {
            _ = self.send.send(scancodes::EXTENDED);
        }
        _ = self.send.send(scancode);
    }

    fn brk(&self, extended: bool, scancode: u8) {
        if extended {
            _ = self.send.send(scancodes::EXTENDED);
        }
        _ = self.send.send(scancodes::BREAK);
        _ = self.send.send(scancode);
    }

    pub fn press(&self, key: SpecialKey) {
        let (extended, scancode) = key.scancode();
        self.make(extended, scancode);
    }

    pub fn release(&self, key: SpecialKey) {
        let (extended, scancode) = key.scancode();
        self.brk(extended, scancode);
    }

    /// Press and release.
    pub fn send_special_key(&self, key: SpecialKey) {
        self.press(key);
        self.release(key);
    }

    /// Types `c`, holding Shift around it if needed.
    pub fn send_char(&self, c: char) -> Result<(), ()> {
        let (scancode, shift) = keymap::key_for_char(c).ok_or(())?;
        if shift {
            self.press(SpecialKey::LeftShift);
        }
        self.make(false, scancode);
        self.brk(false, scancode);
        if shift {
            self.release(SpecialKey::LeftShift);
        }
        Ok(())
    }

    /// Types `c` with Ctrl held.
    pub fn send_ctrl_char(&self, c: char) -> Result<(), ()> {
        let (scancode, _) = keymap::key_for_char(c.to_ascii_lowercase()).ok_or(())?;
        self.press(SpecialKey::LeftCtrl);
        self.make(false, scancode);
        self.brk(false, scancode);
        self.release(SpecialKey::LeftCtrl);
        Ok(())
    }

    /// Types each character of `text`, skipping any with no key.
    pub fn send_str(&self, text: &str) {
        for c in text.chars() {
            let c = if c == '\n' { '\r' } else { c };
            if self.send_char(c).is_err() {
                warn!("No PS2 key for {c:?}");
            }
        }
    }
}

#[cfg(test)]
impl Ps2Sender {
    /// A sender whose scancodes land in the returned receiver.
    pub(crate) fn capture() -> (Self, mpsc::Receiver<u8>) {
        let (send, recv) = mpsc::channel();
        (Self { send }, recv)
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;
    use crate::machine::generic::ps2::translate::Status;
    use crate::machine::generic::ps2::{KeyboardConfig, Ps2Keyboard};

    fn sent(f: impl FnOnce(&Ps2Sender)) -> Vec<u8> {
        let (sender, recv) = Ps2Sender::capture();
        f(&sender);
        recv.try_iter().collect()
    }

    #[test]
    fn test_sender_encodings() {
        assert_eq!(sent(|s| s.send_char('a').unwrap()), hex!("1C F0 1C"));
        assert_eq!(
            sent(|s| s.send_char('A').unwrap()),
            hex!("12 1C F0 1C F0 12")
        );
        assert_eq!(
            sent(|s| s.send_special_key(SpecialKey::Up)),
            hex!("E0 75 E0 F0 75")
        );
        assert_eq!(
            sent(|s| s.send_ctrl_char('C').unwrap()),
            hex!("14 21 F0 21 F0 14")
        );
        assert_eq!(sent(|s| s.send_str("a\n")), hex!("1C F0 1C 5A F0 5A"));
        assert!(sent(|s| assert!(s.send_char('\u{e9}').is_err())).is_empty());
    }

    #[test]
    fn test_command_handling() {
        let (mut device, _sender) = Ps2Device::new(Arc::new(Ps2Wires::new()));
        let leds = device.leds();
        assert_eq!(device.outgoing, hex!("AA"));
        device.outgoing.clear();

        device.handle_frame(HostFrame::Byte(0xED));
        assert_eq!(device.outgoing, hex!("FA"));
        device.handle_frame(HostFrame::Byte(0x04));
        assert_eq!(device.outgoing, hex!("FA FA"));
        assert_eq!(leds.get(), Leds::new(true, false, false));

        device.outgoing.clear();
        device.last_sent = 0x1C;
        device.handle_frame(HostFrame::Byte(0xFE));
        device.handle_frame(HostFrame::Corrupt(0xEE));
        device.handle_frame(HostFrame::Inhibited);
        assert_eq!(device.outgoing, hex!("FE 1C"));

        device.outgoing.clear();
        device.handle_frame(HostFrame::Byte(0xF2));
        device.handle_frame(HostFrame::Byte(0xEE));
        assert_eq!(device.outgoing, hex!("EE FA AB 83"));

        device.outgoing.clear();
        device.handle_frame(HostFrame::Byte(0xFF));
        assert_eq!(device.outgoing, hex!("FA AA"));
        assert_eq!(leds.get(), Leds::default());
    }

    #[test]
    fn test_scanning_disabled_discards_keys() {
        let (mut device, _sender) = Ps2Device::new(Arc::new(Ps2Wires::new()));
        device.handle_frame(HostFrame::Byte(0xF5));
        device.outgoing.clear();
        device.accept(0x1C);
        assert!(device.outgoing.is_empty());

        device.handle_frame(HostFrame::Byte(0xF4));
        device.outgoing.clear();
        device.accept(0x1C);
        assert_eq!(device.outgoing, hex!("1C"));
    }

    struct Rig {
        keyboard: Ps2Keyboard,
        sender: Ps2Sender,
        leds: LedIndicator,
        handle: JoinHandle<()>,
    }

    fn rig() -> Rig {
        let wires = Arc::new(Ps2Wires::new());
        let keyboard = Ps2Keyboard::new(
            wires.clone(),
            KeyboardConfig {
                queue_size: 64,
                rts_hold: Duration::ZERO,
            },
        );
        let (device, sender) = Ps2Device::new(wires);
        let device = device.with_bit_time(Duration::ZERO);
        let leds = device.leds();
        let handle = device.spawn().unwrap();
        Rig {
            keyboard,
            sender,
            leds,
            handle,
        }
    }

    fn type_and_read(keyboard: &mut Ps2Keyboard, expected_len: usize) -> String {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut typed = String::new();
        while typed.chars().count() < expected_len && Instant::now() < deadline {
            match keyboard.poll_char() {
                Some(c) => typed.push(c),
                None => thread::yield_now(),
            }
        }
        typed
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::yield_now();
        }
        false
    }

    #[test]
    fn test_typing_end_to_end() {
        let Rig {
            mut keyboard,
            sender,
            leds,
            handle,
        } = rig();

        sender.send_char('a').unwrap();
        sender.send_char('A').unwrap();
        assert_eq!(type_and_read(&mut keyboard, 2), "aA");
        assert!(keyboard.status().contains(Status::SELF_TEST_PASSED));

        // Caps Lock toggles locally and the keyboard's LED follows.
        sender.send_special_key(SpecialKey::CapsLock);
        sender.send_char('b').unwrap();
        sender.send_char('B').unwrap();
        assert_eq!(type_and_read(&mut keyboard, 2), "Bb");
        assert!(keyboard.status().contains(Status::CAPS_LOCK));
        assert!(keyboard.wait_idle(Duration::from_secs(5)));
        assert!(wait_for(|| leds.get().is_caps()));

        sender.send_special_key(SpecialKey::Up);
        sender.send_ctrl_char('c').unwrap();
        assert_eq!(type_and_read(&mut keyboard, 2), "\x11c");

        keyboard.set_leds(false, true, true);
        assert!(keyboard.wait_idle(Duration::from_secs(5)));
        assert!(wait_for(|| leds.get() == Leds::new(false, true, true)));
        sender.send_special_key(SpecialKey::Kp8);
        assert_eq!(type_and_read(&mut keyboard, 1), "8");

        drop(sender);
        handle.join().unwrap();
        // Acknowledges arrive as bytes but never as characters.
        assert_eq!(keyboard.poll_char(), None);
        let stats = keyboard.stats();
        assert_eq!(stats.parity_errors, 0);
        assert_eq!(stats.missing_acks, 0);
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.sent, 4);
    }

    #[test]
    fn test_device_answers_echo_and_identify() {
        let Rig {
            mut keyboard,
            sender,
            leds: _leds,
            handle,
        } = rig();
        assert!(wait_for(|| {
            keyboard.poll_char();
            keyboard.status().contains(Status::SELF_TEST_PASSED)
        }));
        let before = keyboard.stats().received;

        keyboard.send_command(Command::Echo);
        keyboard.send_command(Command::Identify);
        assert!(keyboard.wait_idle(Duration::from_secs(5)));
        // EE, then FA AB 83.
        assert!(wait_for(|| keyboard.stats().received >= before + 4));
        assert_eq!(keyboard.poll_char(), None);

        drop(sender);
        handle.join().unwrap();
        assert_eq!(keyboard.stats().sent, 2);
        assert_eq!(keyboard.stats().received, before + 4);
    }
}
