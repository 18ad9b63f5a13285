//! Host-to-keyboard commands and the keyboard's replies.

use std::collections::VecDeque;
use std::fmt;

use hex_literal::hex;

/// Keyboard ID returned after [`Command::Identify`] (an MF2 keyboard).
pub const KEYBOARD_ID: [u8; 2] = hex!("AB 83");

/// LED state as sent with `ED`.
///
/// - Bit 2 (0x04): Caps Lock
/// - Bit 1 (0x02): Num Lock
/// - Bit 0 (0x01): Scroll Lock
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Leds(u8);

impl Leds {
    pub fn new(caps: bool, num: bool, scroll: bool) -> Self {
        Leds((caps as u8) << 2 | (num as u8) << 1 | scroll as u8)
    }

    pub fn from_byte(byte: u8) -> Self {
        Leds(byte & 0x07)
    }

    pub fn byte(&self) -> u8 {
        self.0
    }

    pub fn is_scroll(&self) -> bool {
        self.0 & 0x01 == 0x01
    }

    pub fn is_num(&self) -> bool {
        self.0 & 0x02 == 0x02
    }

    pub fn is_caps(&self) -> bool {
        self.0 & 0x04 == 0x04
    }
}

impl fmt::Debug for Leds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Leds({:02X}=", self.0)?;
        let mut first = true;
        for led in [
            ("Caps", self.is_caps()),
            ("Num", self.is_num()),
            ("Scroll", self.is_scroll()),
        ] {
            if led.1 {
                if first {
                    first = false;
                } else {
                    write!(f, "+")?;
                }
                write!(f, "{}", led.0)?;
            }
        }
        write!(f, ")")?;
        Ok(())
    }
}

/// Commands sent from the host to the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Set the Caps/Num/Scroll Lock indicators
    SetLeds(Leds),
    /// Keyboard answers with `EE`
    Echo,
    /// Keyboard answers with its two-byte ID
    Identify,
    /// Set auto-repeat delay and rate
    SetTypematic(u8),
    EnableScanning,
    /// Stop sending scancodes until re-enabled
    DisableScanning,
    SetDefaults,
    /// Ask the keyboard to send its last byte again
    Resend,
    /// Reset and run the basic assurance test
    Reset,
    /// Unrecognised command byte
    Unknown(u8),
}

impl Command {
    /// Returns the number of bytes this command occupies
    pub fn len(&self) -> usize {
        match self {
            Command::SetLeds(_) | Command::SetTypematic(_) => 2,
            _ => 1,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Command::SetLeds(leds) => vec![0xED, leds.byte()],
            Command::Echo => vec![0xEE],
            Command::Identify => vec![0xF2],
            Command::SetTypematic(rate) => vec![0xF3, *rate & 0x7F],
            Command::EnableScanning => vec![0xF4],
            Command::DisableScanning => vec![0xF5],
            Command::SetDefaults => vec![0xF6],
            Command::Resend => vec![0xFE],
            Command::Reset => vec![0xFF],
            Command::Unknown(byte) => vec![*byte],
        }
    }

    /// What the keyboard sends back once the whole command has arrived.
    /// Each byte of a two-byte command is acknowledged separately; this is
    /// the reply to the last one.
    pub fn response(&self) -> Vec<Response> {
        match self {
            Command::Echo => vec![Response::Echo],
            Command::Identify => vec![Response::Ack, Response::KeyboardId],
            Command::Reset => vec![Response::Ack, Response::SelfTestPassed],
            Command::Unknown(_) => vec![Response::Resend],
            // Answered by repeating the last byte sent.
            Command::Resend => vec![],
            _ => vec![Response::Ack],
        }
    }
}

impl TryFrom<&VecDeque<u8>> for Command {
    type Error = ();

    /// Fails while a command's parameter byte has not arrived yet.
    fn try_from(value: &VecDeque<u8>) -> Result<Self, Self::Error> {
        let Some(&byte0) = value.front() else {
            return Err(());
        };

        match byte0 {
            0xED => {
                let Some(&leds) = value.get(1) else {
                    return Err(());
                };
                Ok(Command::SetLeds(Leds::from_byte(leds)))
            }
            0xF3 => {
                let Some(&rate) = value.get(1) else {
                    return Err(());
                };
                Ok(Command::SetTypematic(rate & 0x7F))
            }
            0xEE => Ok(Command::Echo),
            0xF2 => Ok(Command::Identify),
            0xF4 => Ok(Command::EnableScanning),
            0xF5 => Ok(Command::DisableScanning),
            0xF6 => Ok(Command::SetDefaults),
            0xFE => Ok(Command::Resend),
            0xFF => Ok(Command::Reset),
            _ => Ok(Command::Unknown(byte0)),
        }
    }
}

/// Bytes sent from the keyboard that are not scancodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Ack,
    /// Last byte arrived corrupted or was not understood
    Resend,
    Echo,
    /// Basic assurance test passed (power-up or after reset)
    SelfTestPassed,
    SelfTestFailed,
    KeyboardId,
}

impl Response {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Response::Ack => vec![0xFA],
            Response::Resend => vec![0xFE],
            Response::Echo => vec![0xEE],
            Response::SelfTestPassed => vec![0xAA],
            Response::SelfTestFailed => vec![0xFC],
            Response::KeyboardId => KEYBOARD_ID.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn test_parse(input: &[u8], expected: Command) {
        let queue = VecDeque::from_iter(input.iter().copied());
        let command = Command::try_from(&queue).unwrap();
        assert_eq!(command, expected);
        assert_eq!(input.len(), command.len());
        assert_eq!(command.to_bytes(), input);
    }

    #[test]
    fn test_led_commands() {
        test_parse(&[0xED, 0x00], Command::SetLeds(Leds::default()));
        test_parse(&[0xED, 0x04], Command::SetLeds(Leds::new(true, false, false)));
        test_parse(&[0xED, 0x02], Command::SetLeds(Leds::new(false, true, false)));
        test_parse(&[0xED, 0x01], Command::SetLeds(Leds::new(false, false, true)));
        test_parse(&[0xED, 0x07], Command::SetLeds(Leds::new(true, true, true)));
    }

    #[rstest]
    #[case(0xEE, Command::Echo)]
    #[case(0xF2, Command::Identify)]
    #[case(0xF4, Command::EnableScanning)]
    #[case(0xF5, Command::DisableScanning)]
    #[case(0xF6, Command::SetDefaults)]
    #[case(0xFE, Command::Resend)]
    #[case(0xFF, Command::Reset)]
    #[case(0x42, Command::Unknown(0x42))]
    fn test_single_byte_commands(#[case] byte: u8, #[case] expected: Command) {
        test_parse(&[byte], expected);
    }

    #[test]
    fn test_incomplete_commands() {
        assert!(Command::try_from(&VecDeque::new()).is_err());
        assert!(Command::try_from(&VecDeque::from([0xED])).is_err());
        assert!(Command::try_from(&VecDeque::from([0xF3])).is_err());
        test_parse(&[0xF3, 0x20], Command::SetTypematic(0x20));
    }

    #[test]
    fn test_responses() {
        assert_eq!(
            Command::SetLeds(Leds::default()).response(),
            vec![Response::Ack]
        );
        assert_eq!(Command::Echo.response(), vec![Response::Echo]);
        assert_eq!(
            Command::Reset.response(),
            vec![Response::Ack, Response::SelfTestPassed]
        );
        assert_eq!(Command::Unknown(0x01).response(), vec![Response::Resend]);

        assert_eq!(Response::Ack.to_bytes(), vec![0xFA]);
        assert_eq!(Response::SelfTestPassed.to_bytes(), vec![0xAA]);
        assert_eq!(Response::KeyboardId.to_bytes(), vec![0xAB, 0x83]);
    }

    #[test]
    fn test_led_debug() {
        assert_eq!(
            format!("{:?}", Leds::new(true, false, true)),
            "Leds(05=Caps+Scroll)"
        );
        assert_eq!(format!("{:?}", Leds::default()), "Leds(00=)");
    }
}
