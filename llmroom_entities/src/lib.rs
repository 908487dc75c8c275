//! Database entities for rooms and their conversation turns.

pub mod rooms;
pub mod turns;
