use tracing::{debug, warn};

use crate::command::{Annotation, Command, CommandId};
use crate::error::AnnotationError;
use crate::history::{History, HistoryEntry};
use crate::store::PageAnnotationSet;
use crate::PageNumber;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The page's command list changed and its layers must be replayed.
    PageDirty(PageNumber),
    HistoryChanged { can_undo: bool, can_redo: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOutcome {
    Undone { page: PageNumber, id: CommandId },
    Redone { page: PageNumber, id: CommandId },
    NothingToUndo,
    NothingToRedo,
}

impl HistoryOutcome {
    pub fn page(&self) -> Option<PageNumber> {
        match self {
            HistoryOutcome::Undone { page, .. } | HistoryOutcome::Redone { page, .. } => {
                Some(*page)
            }
            HistoryOutcome::NothingToUndo | HistoryOutcome::NothingToRedo => None,
        }
    }
}

/// Owns the annotations and the undo history of one open document.
pub struct AnnotationSession {
    annotations: PageAnnotationSet,
    history: History,
    events: Vec<SessionEvent>,
}

impl AnnotationSession {
    pub fn new(page_count: usize) -> Self {
        Self {
            annotations: PageAnnotationSet::new(page_count),
            history: History::new(),
            events: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.annotations.page_count()
    }

    pub fn contains_page(&self, page: PageNumber) -> bool {
        self.annotations.contains_page(page)
    }

    pub fn annotations(&self) -> &PageAnnotationSet {
        &self.annotations
    }

    pub fn commands(&self, page: PageNumber) -> &[Annotation] {
        self.annotations.commands(page)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo_len(&self) -> usize {
        self.history.undo_len()
    }

    pub fn redo_len(&self) -> usize {
        self.history.redo_len()
    }

    /// Hands over everything emitted since the last call.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Stores `command` on top of its page and makes it the most recent undoable action.
    ///
    /// `scale` is the zoom at which the command's coordinates were captured.
    pub fn push_command(&mut self, command: Command, scale: f32) -> Result<CommandId, AnnotationError> {
        let annotation = Annotation::new(command, scale);
        let id = annotation.id;
        let page = annotation.page();
        let kind = annotation.command.kind();
        if let Err(err) = self.annotations.insert(annotation) {
            warn!(%err, "dropping annotation command");
            return Err(err);
        }
        self.history.record(HistoryEntry { id, page });
        debug!(page, kind, %id, "annotation command stored");
        self.emit_page_dirty(page);
        Ok(id)
    }

    pub fn undo(&mut self) -> HistoryOutcome {
        while let Some(entry) = self.history.pop_done() {
            match self.annotations.remove(entry.page, entry.id) {
                Some(annotation) => {
                    self.history.push_undone(annotation);
                    self.emit_page_dirty(entry.page);
                    return HistoryOutcome::Undone {
                        page: entry.page,
                        id: entry.id,
                    };
                }
                None => warn!(page = entry.page, id = %entry.id, "undo entry without a stored command"),
            }
        }
        HistoryOutcome::NothingToUndo
    }

    pub fn redo(&mut self) -> HistoryOutcome {
        let Some(annotation) = self.history.pop_undone() else {
            return HistoryOutcome::NothingToRedo;
        };
        let page = annotation.page();
        let id = annotation.id;
        match self.annotations.insert(annotation) {
            Ok(()) => {
                self.history.push_done(HistoryEntry { id, page });
                self.emit_page_dirty(page);
                HistoryOutcome::Redone { page, id }
            }
            Err(err) => {
                warn!(%err, "redo dropped a command outside the document");
                self.emit_history();
                HistoryOutcome::NothingToRedo
            }
        }
    }

    /// Takes a live command out of its page and out of the undo stack without
    /// making it redoable. Used when a text edit supersedes the command.
    pub fn retract(&mut self, page: PageNumber, id: CommandId) -> Option<Annotation> {
        let removed = self.annotations.remove(page, id)?;
        self.history.retract(id);
        self.emit_page_dirty(page);
        Some(removed)
    }

    /// Replaces the session's contents with previously saved annotations. History is
    /// reset; restored commands are not undoable.
    pub fn restore(&mut self, annotations: Vec<Annotation>) -> Result<usize, AnnotationError> {
        let mut restored = PageAnnotationSet::new(self.page_count());
        for annotation in annotations {
            restored.insert(annotation)?;
        }
        let dirty: Vec<PageNumber> = self
            .annotations
            .annotated_pages()
            .chain(restored.annotated_pages())
            .collect();
        let count = restored.len();
        self.annotations = restored;
        self.history.clear();
        self.events
            .extend(dirty.into_iter().map(SessionEvent::PageDirty));
        self.emit_history();
        Ok(count)
    }

    fn emit_page_dirty(&mut self, page: PageNumber) {
        self.events.push(SessionEvent::PageDirty(page));
        self.emit_history();
    }

    fn emit_history(&mut self) {
        self.events.push(SessionEvent::HistoryChanged {
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
        });
    }
}
