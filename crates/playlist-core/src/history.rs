//! Linear undo/redo history over full annotation snapshots

use crate::annotation::Annotation;
use std::sync::Arc;

/// Immutable copy of a document's annotation set at one point in time.
pub type Snapshot = Arc<[Annotation]>;

/// Snapshot list plus cursor. Index 0 is always the empty set.
#[derive(Debug, Clone)]
pub struct AnnotationHistory {
    snapshots: Vec<Snapshot>,
    cursor: usize,
}

impl Default for AnnotationHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationHistory {
    pub fn new() -> Self {
        Self {
            snapshots: vec![Arc::from(Vec::new())],
            cursor: 0,
        }
    }

    pub fn current(&self) -> &Snapshot {
        &self.snapshots[self.cursor]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }

    /// Drop every snapshot after the cursor, append `snapshot`, and move the
    /// cursor onto it.
    pub fn push(&mut self, snapshot: Vec<Annotation>) {
        self.snapshots.truncate(self.cursor + 1);
        self.snapshots.push(Arc::from(snapshot));
        self.cursor = self.snapshots.len() - 1;
        tracing::debug!(
            cursor = self.cursor,
            annotations = self.current().len(),
            "history step"
        );
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.snapshots.len()
    }

    /// Returns false (and does nothing) at the start of history.
    pub fn undo(&mut self) -> bool {
        if !self.can_undo() {
            return false;
        }
        self.cursor -= 1;
        true
    }

    /// Returns false (and does nothing) at the end of history.
    pub fn redo(&mut self) -> bool {
        if !self.can_redo() {
            return false;
        }
        self.cursor += 1;
        true
    }
}
