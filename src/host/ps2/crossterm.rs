use ratatui::crossterm::event::{Event, KeyCode, KeyEventKind, KeyModifiers};
use tracing::warn;

use crate::machine::generic::ps2::device::{Ps2Sender, SpecialKey};

/// Turns host key presses into PS/2 keystrokes. Ctrl+G starts a two-key
/// sequence for the things a host terminal cannot type directly.
#[derive(Default)]
pub struct CrosstermKeyboard {
    compose_special_key: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyboardCommand {
    DumpScreen,
    Quit,
}

impl CrosstermKeyboard {
    pub fn update_keyboard(
        &mut self,
        event: &Event,
        sender: &Ps2Sender,
    ) -> Option<KeyboardCommand> {
        let Event::Key(key) = event else {
            return None;
        };
        if key.kind == KeyEventKind::Release {
            return None;
        }

        if self.compose_special_key {
            self.compose_special_key = false;
            match key.code {
                KeyCode::Char('q') => return Some(KeyboardCommand::Quit),
                KeyCode::Char('d') => return Some(KeyboardCommand::DumpScreen),
                KeyCode::Char('c') => sender.send_special_key(SpecialKey::CapsLock),
                KeyCode::Char('n') => sender.send_special_key(SpecialKey::NumLock),
                KeyCode::Char('s') => sender.send_special_key(SpecialKey::ScrollLock),
                KeyCode::Char('g') => {
                    _ = sender.send_ctrl_char('g');
                }
                KeyCode::Char(c) => {
                    if let Some(key) = keypad_key(c) {
                        sender.send_special_key(key);
                    }
                }
                _ => {}
            }
            return None;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('g') => self.compose_special_key = true,
                KeyCode::Char(c) => {
                    if sender.send_ctrl_char(c).is_err() {
                        warn!("No PS2 key for Ctrl+{c:?}");
                    }
                }
                _ => {}
            }
            return None;
        }

        match key.code {
            KeyCode::Char(c) => {
                if sender.send_char(c).is_err() {
                    warn!("No PS2 key for {c:?}");
                }
            }
            KeyCode::Enter => sender.send_special_key(SpecialKey::Enter),
            KeyCode::Backspace => sender.send_special_key(SpecialKey::Backspace),
            KeyCode::Tab => sender.send_special_key(SpecialKey::Tab),
            KeyCode::Esc => sender.send_special_key(SpecialKey::Escape),
            KeyCode::Delete => sender.send_special_key(SpecialKey::Delete),
            KeyCode::Up => sender.send_special_key(SpecialKey::Up),
            KeyCode::Down => sender.send_special_key(SpecialKey::Down),
            KeyCode::Left => sender.send_special_key(SpecialKey::Left),
            KeyCode::Right => sender.send_special_key(SpecialKey::Right),
            _ => {}
        }
        None
    }
}

/// Keypad keys by the character printed on them.
fn keypad_key(c: char) -> Option<SpecialKey> {
    use SpecialKey::*;
    Some(match c {
        '0' => Kp0,
        '1' => Kp1,
        '2' => Kp2,
        '3' => Kp3,
        '4' => Kp4,
        '5' => Kp5,
        '6' => Kp6,
        '7' => Kp7,
        '8' => Kp8,
        '9' => Kp9,
        '.' => KpPeriod,
        '+' => KpPlus,
        '-' => KpMinus,
        '*' => KpStar,
        '/' => KpSlash,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use ratatui::crossterm::event::KeyEvent;
    use rstest::rstest;

    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent::new(code, modifiers))
    }

    fn typed(keyboard: &mut CrosstermKeyboard, events: &[Event]) -> (Vec<u8>, Vec<KeyboardCommand>) {
        let (sender, recv) = Ps2Sender::capture();
        let commands = events
            .iter()
            .filter_map(|event| keyboard.update_keyboard(event, &sender))
            .collect();
        (recv.try_iter().collect(), commands)
    }

    #[rstest]
    #[case::letter(KeyCode::Char('a'), KeyModifiers::NONE, &hex!("1C F0 1C"))]
    #[case::shifted(KeyCode::Char('A'), KeyModifiers::SHIFT, &hex!("12 1C F0 1C F0 12"))]
    #[case::ctrl(KeyCode::Char('c'), KeyModifiers::CONTROL, &hex!("14 21 F0 21 F0 14"))]
    #[case::enter(KeyCode::Enter, KeyModifiers::NONE, &hex!("5A F0 5A"))]
    #[case::up(KeyCode::Up, KeyModifiers::NONE, &hex!("E0 75 E0 F0 75"))]
    #[case::delete(KeyCode::Delete, KeyModifiers::NONE, &hex!("E0 71 E0 F0 71"))]
    fn test_key_mapping(
        #[case] code: KeyCode,
        #[case] modifiers: KeyModifiers,
        #[case] expected: &[u8],
    ) {
        let mut keyboard = CrosstermKeyboard::default();
        let (scancodes, commands) = typed(&mut keyboard, &[key(code, modifiers)]);
        assert_eq!(scancodes, expected);
        assert!(commands.is_empty());
    }

    #[test]
    fn test_compose_sequences() {
        let mut keyboard = CrosstermKeyboard::default();
        let compose = key(KeyCode::Char('g'), KeyModifiers::CONTROL);
        let (scancodes, commands) = typed(
            &mut keyboard,
            &[
                compose.clone(),
                key(KeyCode::Char('c'), KeyModifiers::NONE),
                compose.clone(),
                key(KeyCode::Char('8'), KeyModifiers::NONE),
                compose.clone(),
                key(KeyCode::Char('q'), KeyModifiers::NONE),
            ],
        );
        assert_eq!(scancodes, hex!("58 F0 58 75 F0 75"));
        assert_eq!(commands, vec![KeyboardCommand::Quit]);
    }
}
