#[macro_use]
mod shorthands;
pub use shorthands::*;
