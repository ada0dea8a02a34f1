//! Terminal output: the slot grid and plain listings.

pub mod grid;
pub mod listing;
pub mod theme;
