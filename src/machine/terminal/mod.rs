//! The keyboard terminal: what is typed goes out the UART, what arrives on
//! the UART goes to the LCD.
//!
//! The LCD cannot be read back, so the terminal keeps a copy of the line
//! being received. A CR moves that line to the top of the display and
//! continues on the bottom one.

use std::sync::Arc;

use tracing::{debug, info};

use crate::machine::generic::lcd::{CharacterLcd, Display};
use crate::machine::generic::ps2::wires::HostLines;
use crate::machine::generic::ps2::{KeyboardConfig, Ps2Keyboard};
use crate::machine::generic::serial::{SerialChannel, Uart};

/// Sign-on banner, padded to a full DDRAM line.
pub const SIGN_ON: &str = "PS2 Keybd Term V0.99                    ";
pub const COPYRIGHT: &str = "(C) 2012 KB4OID Labs";
/// Identifies the device to whatever is on the other end of the serial link.
pub const ID: &str = "@0104:0002:0000";

const CR: u8 = 0x0D;
const LF: u8 = 0x0A;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalConfig {
    /// Show typed characters locally and echo serial input back.
    pub echo: bool,
    /// Follow every CR sent with an LF.
    pub lf_add: bool,
    pub line_size: usize,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            echo: false,
            lf_add: true,
            line_size: 40,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Keyboard,
    Serial,
}

pub struct System {
    pub keyboard: Ps2Keyboard,
    pub lcd: CharacterLcd,
    pub uart: Uart,
    config: TerminalConfig,
    line: Vec<u8>,
}

impl System {
    pub fn new(
        lines: Arc<dyn HostLines>,
        keyboard: KeyboardConfig,
        config: TerminalConfig,
    ) -> (Self, SerialChannel) {
        let (uart, host) = Uart::new();
        let system = Self {
            keyboard: Ps2Keyboard::new(lines, keyboard),
            lcd: CharacterLcd::default(),
            uart,
            config,
            line: Vec::with_capacity(config.line_size),
        };
        (system, host)
    }

    pub fn config(&self) -> &TerminalConfig {
        &self.config
    }

    /// The line received so far.
    pub fn line(&self) -> &[u8] {
        &self.line
    }

    fn send_line(&mut self, text: &str) {
        self.uart.send_bytes(text.as_bytes());
        self.uart.send_bytes(&[CR, LF]);
    }

    /// Announces the terminal over serial and on the LCD.
    pub fn sign_on(&mut self) {
        info!("Terminal sign-on");
        self.send_line(SIGN_ON);
        self.send_line(COPYRIGHT);
        self.send_line(ID);
        self.lcd.clear();
        self.lcd.puts(SIGN_ON.as_bytes());
        self.lcd.puts(COPYRIGHT.as_bytes());
    }

    /// Clears the sign-on and parks the cursor on the input line.
    pub fn start(&mut self) {
        self.line.clear();
        self.refresh();
    }

    /// Copies the line buffer to the top line and continues on the bottom one.
    fn refresh(&mut self) {
        self.lcd.clear();
        self.lcd.goto(0, 0);
        self.lcd.puts(&self.line);
        self.lcd.goto(0, 1);
        self.line.clear();
    }

    fn buffer(&mut self, c: u8) {
        let line_size = self.config.line_size.max(1);
        if self.line.len() < line_size {
            self.line.push(c);
        } else if let Some(last) = self.line.last_mut() {
            *last = c;
        }
    }

    pub fn process_char(&mut self, source: Source, c: u8) {
        let display = source == Source::Serial || self.config.echo;
        let transmit = source == Source::Keyboard || self.config.echo;
        if c == CR {
            if display {
                self.refresh();
            }
            if transmit {
                self.uart.send_byte(CR);
                if self.config.lf_add {
                    self.uart.send_byte(LF);
                }
            }
        } else {
            if display {
                self.lcd.write_char(c);
                self.buffer(c);
            }
            if transmit {
                self.uart.send_byte(c);
            }
        }
    }

    /// Handles everything the keyboard and the UART have ready. Returns
    /// whether anything was processed.
    pub fn step(&mut self) -> bool {
        let mut busy = false;
        while let Some(c) = self.keyboard.poll_char() {
            busy = true;
            match u8::try_from(c) {
                Ok(c) => self.process_char(Source::Keyboard, c),
                Err(_) => debug!("Ignoring non-ASCII key {c:?}"),
            }
        }
        while let Some(c) = self.uart.receive() {
            busy = true;
            self.process_char(Source::Serial, c);
        }
        busy
    }

    pub fn dump_screen_text(&self) -> String {
        self.lcd.text()
    }
}
