use std::io;
use std::time::{Duration, Instant};

use ratatui::buffer::Buffer;
use ratatui::crossterm;
use ratatui::layout::Rect;
use ratatui::prelude::CrosstermBackend;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Span;
use ratatui::widgets::Widget;
use tracing::warn;

use super::Session;
use crate::host::ps2::crossterm::{CrosstermKeyboard, KeyboardCommand};
use crate::machine::generic::lcd::{CharacterLcd, LINES};

const FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// The LCD glass: its visible columns on a green backlight.
pub struct LcdScreen<'a> {
    lcd: &'a CharacterLcd,
}

impl<'a> LcdScreen<'a> {
    pub fn new(lcd: &'a CharacterLcd) -> Self {
        Self { lcd }
    }
}

impl<'a> Widget for LcdScreen<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let glass = Style::default().fg(Color::Black).bg(Color::LightGreen);
        let (cursor_x, cursor_y) = self.lcd.cursor();
        for y in 0..LINES {
            let row = area.top() + y as u16;
            if row >= area.bottom() {
                break;
            }
            for (x, ch) in self.lcd.line_text(y).chars().enumerate() {
                let col = area.left() + x as u16;
                if col >= area.right() {
                    break;
                }
                if let Some(cell) = buf.cell_mut((col, row)) {
                    cell.set_symbol(ch.encode_utf8(&mut [0; 4]));
                    let cursor = self.lcd.cursor_visible() && (x, y) == (cursor_x, cursor_y);
                    cell.set_style(if cursor {
                        glass.add_modifier(Modifier::REVERSED)
                    } else {
                        glass
                    });
                }
            }
        }
    }
}

pub fn run(session: &mut Session) -> Result<(), Box<dyn std::error::Error>> {
    crossterm::terminal::enable_raw_mode()?;
    crossterm::execute!(io::stdout(), crossterm::terminal::EnterAlternateScreen,)?;
    crossterm::execute!(
        io::stdout(),
        crossterm::terminal::Clear(crossterm::terminal::ClearType::All),
    )?;

    let res = run_inner(session);

    crossterm::terminal::disable_raw_mode()?;
    crossterm::execute!(io::stdout(), crossterm::terminal::LeaveAlternateScreen,)?;
    res
}

fn run_inner(session: &mut Session) -> Result<(), Box<dyn std::error::Error>> {
    let mut keyboard = CrosstermKeyboard::default();
    let mut terminal = ratatui::Terminal::new(CrosstermBackend::new(io::stdout()))?;
    let mut last_frame: Option<Instant> = None;
    loop {
        let busy = session.step();

        if crossterm::event::poll(Duration::from_millis(if busy { 0 } else { 1 }))? {
            let start = Instant::now();
            let event = crossterm::event::read()?;
            if start.elapsed() > Duration::from_millis(100) {
                warn!("Event read took too long: {:?}", start.elapsed());
            }
            match keyboard.update_keyboard(&event, &session.sender) {
                Some(KeyboardCommand::DumpScreen) => {
                    session.dump_screen(&std::env::temp_dir().join("ps2-term-lcd.txt"))?;
                }
                Some(KeyboardCommand::Quit) => break,
                None => {}
            }
        }

        if last_frame.is_some_and(|t| t.elapsed() < FRAME_INTERVAL) {
            continue;
        }
        last_frame = Some(Instant::now());
        let status = session.status_line();
        terminal.draw(|f| {
            let area = f.area();
            let lcd = Rect::new(area.x, area.y, area.width, area.height.min(LINES as u16));
            f.render_widget(LcdScreen::new(&session.system.lcd), lcd);
            if area.height > LINES as u16 + 1 {
                let line = Span::styled(status, Style::default().fg(Color::LightBlue));
                let row = Rect::new(area.x, area.y + LINES as u16 + 1, area.width, 1);
                f.render_widget(line, row);
                let help = Span::styled(
                    "Ctrl+G: q quit, d dump LCD, c/n/s locks, 0-9 keypad",
                    Style::default().fg(Color::DarkGray),
                );
                let row = Rect::new(area.x, area.y + LINES as u16 + 2, area.width, 1);
                f.render_widget(help.into_right_aligned_line(), row);
            }
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::generic::lcd::{Display, commands};

    fn row(buf: &Buffer, y: u16) -> String {
        (0..buf.area.width)
            .map(|x| buf[(x, y)].symbol().to_string())
            .collect()
    }

    #[test]
    fn test_lcd_screen_renders_lines_and_cursor() {
        let mut lcd = CharacterLcd::new(8);
        lcd.puts(b"hello");
        lcd.goto(0, 1);
        lcd.puts(b"world");
        lcd.write_command(commands::DISPLAY_CONTROL | commands::DISPLAY_ON | commands::CURSOR_ON);

        let mut buf = Buffer::empty(Rect::new(0, 0, 10, 2));
        LcdScreen::new(&lcd).render(buf.area, &mut buf);
        assert_eq!(row(&buf, 0), "hello     ");
        assert_eq!(row(&buf, 1), "world     ");
        assert!(buf[(5, 1)].modifier.contains(Modifier::REVERSED));
        assert!(!buf[(4, 1)].modifier.contains(Modifier::REVERSED));
    }

    #[test]
    fn test_lcd_screen_clips_to_area() {
        let lcd = CharacterLcd::default();
        let mut buf = Buffer::empty(Rect::new(0, 0, 4, 1));
        LcdScreen::new(&lcd).render(buf.area, &mut buf);
        assert_eq!(row(&buf, 0), "    ");
    }
}
