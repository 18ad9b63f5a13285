pub mod generic;
pub mod terminal;
