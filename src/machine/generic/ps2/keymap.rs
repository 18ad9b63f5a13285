//! Scancode set 2 translation tables.
//!
//! Four tables resolve a scancode to a character: the base layer, the
//! shifted layer, the keypad with Num Lock on, and `E0`-prefixed keys. Each
//! scancode appears at most once per table.

/// Scancodes with a fixed meaning to the translator.
pub mod scancodes {
    pub const EXTENDED: u8 = 0xE0;
    pub const BREAK: u8 = 0xF0;
    pub const SELF_TEST_PASSED: u8 = 0xAA;

    pub const LEFT_SHIFT: u8 = 0x12;
    pub const RIGHT_SHIFT: u8 = 0x59;
    /// Left Ctrl, or right Ctrl after `E0`.
    pub const CTRL: u8 = 0x14;
    /// Left Alt, or right Alt after `E0`.
    pub const ALT: u8 = 0x11;
    pub const CAPS_LOCK: u8 = 0x58;
    pub const NUM_LOCK: u8 = 0x77;
    pub const SCROLL_LOCK: u8 = 0x7E;
}

/// Control characters produced by non-printing keys.
pub mod ascii {
    pub const BS: char = '\x08';
    pub const TAB: char = '\t';
    pub const CR: char = '\r';
    pub const ESC: char = '\x1b';
    pub const DEL: char = '\x7f';
    /// Cursor up.
    pub const DC1: char = '\x11';
    /// Cursor down.
    pub const DC2: char = '\x12';
    /// Cursor left.
    pub const DC3: char = '\x13';
    /// Cursor right.
    pub const DC4: char = '\x14';
}

use self::ascii::*;

/// Typing keys: scancode, unshifted character, and the shifted character
/// where it differs. Also generates the reverse lookup used to type text.
macro_rules! def_typing_keys {
    ($($scancode:literal => $char:literal $( $char_shift:literal )?;)*) => {
        fn typing_normal(scancode: u8) -> Option<char> {
            match scancode {
                $($scancode => Some($char),)*
                _ => None,
            }
        }

        /// Looks up `scancode` in the shifted table.
        pub fn shifted(scancode: u8) -> Option<char> {
            match scancode {
                $($( $scancode => Some($char_shift), )?)*
                _ => None,
            }
        }

        /// Finds the key that types `c`, and whether Shift must be held for it.
        pub fn key_for_char(c: char) -> Option<(u8, bool)> {
            match c {
                $(
                    $char => Some(($scancode, false)),
                    $( $char_shift => Some(($scancode, true)), )?
                )*
                _ => None,
            }
        }
    };
}

def_typing_keys!(
0x0E => '`' '~';
0x16 => '1' '!';
0x1E => '2' '@';
0x26 => '3' '#';
0x25 => '4' '$';
0x2E => '5' '%';
0x36 => '6' '^';
0x3D => '7' '&';
0x3E => '8' '*';
0x46 => '9' '(';
0x45 => '0' ')';
0x4E => '-' '_';
0x55 => '=' '+';
0x66 => '\x08';
0x0D => '\t';

0x15 => 'q' 'Q';
0x1D => 'w' 'W';
0x24 => 'e' 'E';
0x2D => 'r' 'R';
0x2C => 't' 'T';
0x35 => 'y' 'Y';
0x3C => 'u' 'U';
0x43 => 'i' 'I';
0x44 => 'o' 'O';
0x4D => 'p' 'P';
0x54 => '[' '{';
0x5B => ']' '}';
0x5D => '\\' '|';

0x1C => 'a' 'A';
0x1B => 's' 'S';
0x23 => 'd' 'D';
0x2B => 'f' 'F';
0x34 => 'g' 'G';
0x33 => 'h' 'H';
0x3B => 'j' 'J';
0x42 => 'k' 'K';
0x4B => 'l' 'L';
0x4C => ';' ':';
0x52 => '\'' '"';
0x5A => '\r';

0x1A => 'z' 'Z';
0x22 => 'x' 'X';
0x21 => 'c' 'C';
0x2A => 'v' 'V';
0x32 => 'b' 'B';
0x31 => 'n' 'N';
0x3A => 'm' 'M';
0x41 => ',' '<';
0x49 => '.' '>';
0x4A => '/' '?';

0x29 => ' ';
0x76 => '\x1b';
);

/// Keypad keys with Num Lock off. Keypad 8/2/4/6 double as cursor keys.
fn keypad(scancode: u8) -> Option<char> {
    Some(match scancode {
        0x7C => '*',
        0x7B => '-',
        0x79 => '+',
        0x71 => '.',
        0x70 => '0',
        0x69 => '1',
        0x7A => '3',
        0x73 => '5',
        0x6C => '7',
        0x7D => '9',
        0x75 => DC1,
        0x72 => DC2,
        0x6B => DC3,
        0x74 => DC4,
        _ => return None,
    })
}

/// Looks up `scancode` in the base table.
pub fn normal(scancode: u8) -> Option<char> {
    typing_normal(scancode).or_else(|| keypad(scancode))
}

/// Looks up `scancode` in the Num Lock table.
pub fn numlock(scancode: u8) -> Option<char> {
    Some(match scancode {
        0x75 => '8',
        0x72 => '2',
        0x6B => '4',
        0x74 => '6',
        _ => return None,
    })
}

/// Looks up `scancode` (without its `E0` prefix) in the extended table.
pub fn extended(scancode: u8) -> Option<char> {
    Some(match scancode {
        0x4A => '/',
        0x5A => CR,
        0x75 => DC1,
        0x72 => DC2,
        0x6B => DC3,
        0x74 => DC4,
        0x71 => DEL,
        _ => return None,
    })
}
