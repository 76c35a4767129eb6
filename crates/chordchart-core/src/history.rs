//! Linear undo/redo over immutable snapshots.

use tracing::{debug, trace};

/// How a dispatched snapshot is stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// Drop any redo branch and append a new undo step.
    #[default]
    Push,
    /// Replace the current snapshot in place, without a new undo step.
    Overwrite,
}

/// Snapshot stack plus a cursor. Always holds at least one snapshot and the
/// cursor always points at one of them.
#[derive(Debug, Clone)]
pub struct History<T> {
    snapshots: Vec<T>,
    index: usize,
}

impl<T: Clone + PartialEq> History<T> {
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self {
            snapshots: vec![initial],
            index: 0,
        }
    }

    #[must_use]
    pub fn current(&self) -> &T {
        &self.snapshots[self.index]
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of stored snapshots, never zero.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.snapshots.len()
    }

    #[must_use]
    pub fn snapshots(&self) -> &[T] {
        &self.snapshots
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.snapshots.len()
    }

    /// Stores `next`. Returns `false` when it equals the current snapshot,
    /// in which case nothing changes.
    pub fn dispatch(&mut self, next: T, mode: DispatchMode) -> bool {
        if next == *self.current() {
            debug!(index = self.index, "dispatch noop: snapshot unchanged");
            return false;
        }

        match mode {
            DispatchMode::Overwrite => {
                self.snapshots[self.index] = next;
            }
            DispatchMode::Push => {
                let discarded = self.snapshots.len() - self.index - 1;
                self.snapshots.truncate(self.index + 1);
                self.snapshots.push(next);
                self.index = self.snapshots.len() - 1;
                if discarded > 0 {
                    debug!(discarded, "redo branch discarded");
                }
            }
        }
        trace!(index = self.index, len = self.snapshots.len(), ?mode, "snapshot stored");
        true
    }

    /// Derives the next snapshot from the current one, then dispatches it.
    pub fn dispatch_with<F>(&mut self, update: F, mode: DispatchMode) -> bool
    where
        F: FnOnce(&T) -> T,
    {
        let next = update(self.current());
        self.dispatch(next, mode)
    }

    pub fn undo(&mut self) -> bool {
        if !self.can_undo() {
            return false;
        }
        self.index -= 1;
        true
    }

    pub fn redo(&mut self) -> bool {
        if !self.can_redo() {
            return false;
        }
        self.index += 1;
        true
    }

    /// Collapses the stack to `snapshot` alone. Nothing before it can be undone.
    pub fn reset(&mut self, snapshot: T) {
        self.snapshots = vec![snapshot];
        self.index = 0;
    }
}
