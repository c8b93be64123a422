use crate::command::{Annotation, CommandId};
use crate::PageNumber;

/// Reference to a live command in the page annotation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: CommandId,
    pub page: PageNumber,
}

/// Linear undo/redo over commands of every page.
///
/// `done` only references commands (they live in the page set); `undone` owns the
/// commands that were taken out of their page.
#[derive(Debug, Default)]
pub struct History {
    done: Vec<HistoryEntry>,
    undone: Vec<Annotation>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new action. Forward history is discarded.
    pub fn record(&mut self, entry: HistoryEntry) {
        self.done.push(entry);
        self.undone.clear();
    }

    pub fn pop_done(&mut self) -> Option<HistoryEntry> {
        self.done.pop()
    }

    pub fn push_undone(&mut self, annotation: Annotation) {
        self.undone.push(annotation);
    }

    pub fn pop_undone(&mut self) -> Option<Annotation> {
        self.undone.pop()
    }

    /// Re-enters a command on the undo side without touching forward history.
    pub fn push_done(&mut self, entry: HistoryEntry) {
        self.done.push(entry);
    }

    /// Drops a command from the undo side, e.g. when a text edit replaces it.
    pub fn retract(&mut self, id: CommandId) -> bool {
        match self.done.iter().rposition(|entry| entry.id == id) {
            Some(index) => {
                self.done.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.done.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.undone.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.done.len()
    }

    pub fn redo_len(&self) -> usize {
        self.undone.len()
    }

    pub fn clear(&mut self) {
        self.done.clear();
        self.undone.clear();
    }
}
