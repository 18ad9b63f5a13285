//! HD44780-style character LCD, two lines of 40 DDRAM cells.

use tracing::{trace, warn};

pub const DDRAM_COLUMNS: usize = 40;
pub const LINES: usize = 2;
pub const LINE1_START: u8 = 0x00;
pub const LINE2_START: u8 = 0x40;

/// Instruction bytes. The highest set bit selects the instruction.
pub mod commands {
    pub const CLEAR: u8 = 0x01;
    pub const HOME: u8 = 0x02;
    pub const ENTRY_MODE: u8 = 0x04;
    pub const ENTRY_INCREMENT: u8 = 0x02;
    pub const ENTRY_SHIFT: u8 = 0x01;
    pub const DISPLAY_CONTROL: u8 = 0x08;
    pub const DISPLAY_ON: u8 = 0x04;
    pub const CURSOR_ON: u8 = 0x02;
    pub const BLINK_ON: u8 = 0x01;
    pub const SHIFT: u8 = 0x10;
    pub const SHIFT_DISPLAY: u8 = 0x08;
    pub const SHIFT_RIGHT: u8 = 0x04;
    pub const FUNCTION_SET: u8 = 0x20;
    pub const SET_CGRAM: u8 = 0x40;
    pub const SET_DDRAM: u8 = 0x80;
}

/// The display side of the terminal: a blocking sink for instructions and
/// characters.
pub trait Display {
    fn write_command(&mut self, cmd: u8);
    fn write_char(&mut self, c: u8);

    fn clear(&mut self) {
        self.write_command(commands::CLEAR);
    }

    /// Moves the cursor to column `x` of line `y`.
    fn goto(&mut self, x: u8, y: u8) {
        let start = if y == 0 { LINE1_START } else { LINE2_START };
        self.write_command(commands::SET_DDRAM | (start + x));
    }

    fn puts(&mut self, s: &[u8]) {
        for &c in s {
            self.write_char(c);
        }
    }
}

#[derive(Debug, Clone)]
pub struct CharacterLcd {
    ddram: [[u8; DDRAM_COLUMNS]; LINES],
    /// Cursor as (line, column).
    cursor: (usize, usize),
    visible_columns: usize,
    increment: bool,
    shift_on_write: bool,
    display_on: bool,
    cursor_on: bool,
    blink_on: bool,
    /// Leftmost DDRAM column shown.
    display_offset: usize,
}

impl Default for CharacterLcd {
    fn default() -> Self {
        Self::new(DDRAM_COLUMNS)
    }
}

impl CharacterLcd {
    pub fn new(visible_columns: usize) -> Self {
        Self {
            ddram: [[b' '; DDRAM_COLUMNS]; LINES],
            cursor: (0, 0),
            visible_columns: visible_columns.clamp(1, DDRAM_COLUMNS),
            increment: true,
            shift_on_write: false,
            display_on: true,
            cursor_on: false,
            blink_on: false,
            display_offset: 0,
        }
    }

    pub fn visible_columns(&self) -> usize {
        self.visible_columns
    }

    /// Cursor position as (column, line).
    pub fn cursor(&self) -> (usize, usize) {
        (self.cursor.1, self.cursor.0)
    }

    pub fn display_on(&self) -> bool {
        self.display_on
    }

    pub fn cursor_visible(&self) -> bool {
        self.cursor_on || self.blink_on
    }

    /// The visible part of line `y`, as shown on the glass.
    pub fn line_text(&self, y: usize) -> String {
        if !self.display_on || y >= LINES {
            return " ".repeat(self.visible_columns);
        }
        (0..self.visible_columns)
            .map(|x| {
                let c = self.ddram[y][(self.display_offset + x) % DDRAM_COLUMNS];
                if c.is_ascii_graphic() || c == b' ' {
                    c as char
                } else {
                    '\u{00B7}'
                }
            })
            .collect()
    }

    /// Both lines, newline separated.
    pub fn text(&self) -> String {
        (0..LINES)
            .map(|y| self.line_text(y))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn set_address(&mut self, address: u8) {
        let line = usize::from(address & 0x40 != 0);
        let column = usize::from(address & 0x3F);
        if column >= DDRAM_COLUMNS {
            warn!("LCD DDRAM address {address:02X} out of range");
            self.cursor = ((line + 1) % LINES, 0);
        } else {
            self.cursor = (line, column);
        }
    }

    fn advance(&mut self) {
        let (line, column) = self.cursor;
        self.cursor = if self.increment {
            if column + 1 < DDRAM_COLUMNS {
                (line, column + 1)
            } else {
                ((line + 1) % LINES, 0)
            }
        } else if column > 0 {
            (line, column - 1)
        } else {
            ((line + LINES - 1) % LINES, DDRAM_COLUMNS - 1)
        };
    }

    fn shift_display(&mut self, right: bool) {
        self.display_offset = if right {
            (self.display_offset + DDRAM_COLUMNS - 1) % DDRAM_COLUMNS
        } else {
            (self.display_offset + 1) % DDRAM_COLUMNS
        };
    }
}

impl Display for CharacterLcd {
    fn write_command(&mut self, cmd: u8) {
        use commands::*;
        trace!("LCD command {cmd:02X}");
        if cmd & SET_DDRAM != 0 {
            self.set_address(cmd & 0x7F);
        } else if cmd & SET_CGRAM != 0 {
            warn!("LCD CGRAM write ignored: {cmd:02X}");
        } else if cmd & FUNCTION_SET != 0 {
            trace!("LCD function set ignored");
        } else if cmd & SHIFT != 0 {
            if cmd & SHIFT_DISPLAY != 0 {
                self.shift_display(cmd & SHIFT_RIGHT != 0);
            } else {
                let increment = self.increment;
                self.increment = cmd & SHIFT_RIGHT != 0;
                self.advance();
                self.increment = increment;
            }
        } else if cmd & DISPLAY_CONTROL != 0 {
            self.display_on = cmd & DISPLAY_ON != 0;
            self.cursor_on = cmd & CURSOR_ON != 0;
            self.blink_on = cmd & BLINK_ON != 0;
        } else if cmd & ENTRY_MODE != 0 {
            self.increment = cmd & ENTRY_INCREMENT != 0;
            self.shift_on_write = cmd & ENTRY_SHIFT != 0;
        } else if cmd & HOME != 0 {
            self.cursor = (0, 0);
            self.display_offset = 0;
        } else if cmd & CLEAR != 0 {
            self.ddram = [[b' '; DDRAM_COLUMNS]; LINES];
            self.cursor = (0, 0);
            self.display_offset = 0;
            self.increment = true;
        }
    }

    fn write_char(&mut self, c: u8) {
        if c == b'\n' {
            let line = (self.cursor.0 + 1) % LINES;
            self.cursor = (line, 0);
            return;
        }
        let (line, column) = self.cursor;
        self.ddram[line][column] = c;
        self.advance();
        if self.shift_on_write {
            self.shift_display(!self.increment);
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::commands::*;
    use super::*;

    #[test]
    fn test_write_and_goto() {
        let mut lcd = CharacterLcd::new(16);
        lcd.puts(b"Hello");
        lcd.goto(2, 1);
        lcd.puts(b"World");
        assert_eq!(lcd.line_text(0), "Hello           ");
        assert_eq!(lcd.line_text(1), "  World         ");
        assert_eq!(lcd.cursor(), (7, 1));

        lcd.clear();
        assert_eq!(lcd.text(), format!("{0}\n{0}", " ".repeat(16)));
        assert_eq!(lcd.cursor(), (0, 0));
    }

    #[test]
    fn test_line_wraps_to_second_line() {
        let mut lcd = CharacterLcd::default();
        lcd.puts(&[b'x'; DDRAM_COLUMNS]);
        assert_eq!(lcd.cursor(), (0, 1));
        lcd.puts(b"yz");
        assert_eq!(lcd.line_text(1).trim_end(), "yz");
        lcd.goto(39, 1);
        lcd.write_char(b'!');
        assert_eq!(lcd.cursor(), (0, 0));
    }

    #[test]
    fn test_newline_moves_to_other_line() {
        let mut lcd = CharacterLcd::new(8);
        lcd.puts(b"ab\ncd\nef");
        assert_eq!(lcd.line_text(0), "ef      ");
        assert_eq!(lcd.line_text(1), "cd      ");
    }

    #[rstest]
    #[case::function_set(FUNCTION_SET | 0x08)]
    #[case::cgram(SET_CGRAM | 0x10)]
    fn test_ignored_commands(#[case] cmd: u8) {
        let mut lcd = CharacterLcd::new(4);
        lcd.puts(b"ab");
        lcd.write_command(cmd);
        assert_eq!(lcd.line_text(0), "ab  ");
        assert_eq!(lcd.cursor(), (2, 0));
    }

    #[test]
    fn test_display_control_and_shift() {
        let mut lcd = CharacterLcd::new(4);
        lcd.puts(b"abcd");
        lcd.write_command(DISPLAY_CONTROL);
        assert!(!lcd.display_on());
        assert_eq!(lcd.line_text(0), "    ");
        lcd.write_command(DISPLAY_CONTROL | DISPLAY_ON | CURSOR_ON);
        assert!(lcd.cursor_visible());

        lcd.write_command(SHIFT | SHIFT_DISPLAY);
        assert_eq!(lcd.line_text(0), "bcd ");
        lcd.write_command(HOME);
        assert_eq!(lcd.line_text(0), "abcd");

        // Cursor moves without touching DDRAM.
        lcd.write_command(SHIFT | SHIFT_RIGHT);
        assert_eq!(lcd.cursor(), (1, 0));
        lcd.write_command(SHIFT);
        assert_eq!(lcd.cursor(), (0, 0));
    }

    #[test]
    fn test_entry_mode_decrement() {
        let mut lcd = CharacterLcd::new(4);
        lcd.goto(3, 0);
        lcd.write_command(ENTRY_MODE);
        lcd.puts(b"abc");
        assert_eq!(lcd.line_text(0), " cba");
        assert_eq!(lcd.cursor(), (0, 0));
    }
}
