//! Bounded undo/redo over serialized document snapshots.
//!
//! The history never interprets its entries; they are opaque strings
//! (in practice, JSON documents from [`crate::serialize`]). Callers own
//! the protocol: snapshot before a mutation, push it, and hand the
//! current state to `undo`/`redo` so the opposite stack stays coherent.

/// Default number of undo entries kept.
pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
pub struct History {
    undo: Vec<String>,
    redo: Vec<String>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl History {
    /// A history holding at most `capacity` undo entries. Zero is
    /// promoted to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record a snapshot taken before a mutation. Clears the redo
    /// stack; the oldest entry is dropped beyond capacity.
    pub fn push(&mut self, snapshot: String) {
        self.undo.push(snapshot);
        if self.undo.len() > self.capacity {
            self.undo.remove(0);
        }
        self.redo.clear();
    }

    /// Step back: `current` moves onto the redo stack and the latest
    /// snapshot comes off. `None` when there is nothing to undo.
    pub fn undo(&mut self, current: String) -> Option<String> {
        let snapshot = self.undo.pop()?;
        self.redo.push(current);
        Some(snapshot)
    }

    /// Step forward again after an undo.
    pub fn redo(&mut self, current: String) -> Option<String> {
        let snapshot = self.redo.pop()?;
        self.undo.push(current);
        Some(snapshot)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
