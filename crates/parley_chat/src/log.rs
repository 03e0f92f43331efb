//! Append-only message log.
//!
//! The log owns display ordering: turns are rendered in the order they were
//! appended and are never edited or reordered afterwards.

use crate::types::{Author, Turn};

/// Ordered record of every turn in the conversation
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    turns: Vec<Turn>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn and return a reference to the stored copy
    pub fn append(&mut self, turn: Turn) -> &Turn {
        self.turns.push(turn);
        &self.turns[self.turns.len() - 1]
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Turns appended at or after `index`
    pub fn since(&self, index: usize) -> &[Turn] {
        self.turns.get(index..).unwrap_or(&[])
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    /// Number of system-authored turns, mostly useful for error accounting
    pub fn system_count(&self) -> usize {
        self.turns.iter().filter(|t| t.author == Author::System).count()
    }
}
