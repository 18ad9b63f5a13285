//! Scripted keyboard input from the command line.

use std::num::ParseIntError;

/// One `--scancodes` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scancodes(pub Vec<u8>);

/// Parses hex scancodes separated by spaces or commas, e.g. `"E0 75 E0 F0 75"`.
pub fn parse_scancodes(s: &str) -> Result<Scancodes, ParseIntError> {
    s.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .map(|token| {
            let token = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            u8::from_str_radix(token, 16)
        })
        .collect::<Result<Vec<u8>, _>>()
        .map(Scancodes)
}
