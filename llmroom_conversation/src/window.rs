//! Selection of the history sent to the backend.
//!
//! The full room history is sent by default. A turn limit is an explicit opt-in.

use llmroom_core::Turn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextWindow {
    /// Every stored turn, oldest first.
    #[default]
    Unbounded,
    /// Only the newest `n` turns, still oldest first.
    LastTurns(usize),
}

impl ContextWindow {
    /// `None` and `Some(0)` both mean unbounded.
    #[must_use]
    pub const fn from_limit(limit: Option<usize>) -> Self {
        match limit {
            Some(n) if n > 0 => Self::LastTurns(n),
            _ => Self::Unbounded,
        }
    }

    #[must_use]
    pub fn select(self, mut turns: Vec<Turn>) -> Vec<Turn> {
        match self {
            Self::Unbounded => turns,
            Self::LastTurns(n) => {
                let start = turns.len().saturating_sub(n);
                turns.drain(..start);
                turns
            }
        }
    }
}
