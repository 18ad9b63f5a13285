pub mod comm;
pub mod logging;
pub mod ps2;
pub mod screen;
pub mod script;
