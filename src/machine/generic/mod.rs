pub mod lcd;
pub mod ps2;
pub mod serial;
