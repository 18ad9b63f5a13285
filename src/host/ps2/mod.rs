#[cfg(feature = "tui")]
pub mod crossterm;
