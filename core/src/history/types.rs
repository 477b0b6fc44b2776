use crate::dof::{Dof, DofKind};
use crate::error::{SketchError, SketchResult};
use crate::ids::DofId;
use crate::sketch::{ConstraintEquation, Primitive};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One reversible edit to the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Change {
    InsertDof { dof: Dof },
    RemoveDof { dof: Dof },
    RedefineDof { id: DofId, from: DofKind, to: DofKind },
    SetValue { id: DofId, from: f64, to: f64 },
    SetFree { id: DofId, from: bool, to: bool },
    InsertPrimitive { primitive: Primitive },
    RemovePrimitive { primitive: Primitive },
    UpdatePrimitive { from: Primitive, to: Primitive },
    InsertConstraint { constraint: ConstraintEquation },
    RemoveConstraint { constraint: ConstraintEquation },
    UpdateConstraint { from: ConstraintEquation, to: ConstraintEquation },
}

impl Change {
    pub fn inverse(&self) -> Change {
        match self.clone() {
            Change::InsertDof { dof } => Change::RemoveDof { dof },
            Change::RemoveDof { dof } => Change::InsertDof { dof },
            Change::RedefineDof { id, from, to } => Change::RedefineDof { id, from: to, to: from },
            Change::SetValue { id, from, to } => Change::SetValue { id, from: to, to: from },
            Change::SetFree { id, from, to } => Change::SetFree { id, from: to, to: from },
            Change::InsertPrimitive { primitive } => Change::RemovePrimitive { primitive },
            Change::RemovePrimitive { primitive } => Change::InsertPrimitive { primitive },
            Change::UpdatePrimitive { from, to } => Change::UpdatePrimitive { from: to, to: from },
            Change::InsertConstraint { constraint } => Change::RemoveConstraint { constraint },
            Change::RemoveConstraint { constraint } => Change::InsertConstraint { constraint },
            Change::UpdateConstraint { from, to } => Change::UpdateConstraint { from: to, to: from },
        }
    }

    /// Largest id mentioned by this change.
    pub fn max_id(&self) -> u64 {
        match self {
            Change::InsertDof { dof } | Change::RemoveDof { dof } => dof.id.raw(),
            Change::RedefineDof { id, .. } | Change::SetValue { id, .. } | Change::SetFree { id, .. } => {
                id.raw()
            }
            Change::InsertPrimitive { primitive } | Change::RemovePrimitive { primitive } => primitive.id.raw(),
            Change::UpdatePrimitive { to, .. } => to.id.raw(),
            Change::InsertConstraint { constraint } | Change::RemoveConstraint { constraint } => {
                constraint.id.raw()
            }
            Change::UpdateConstraint { to, .. } => to.id.raw(),
        }
    }
}

/// An ordered batch of changes applied as a unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transition {
    pub changes: Vec<Change>,
}

impl Transition {
    pub fn new(changes: Vec<Change>) -> Self {
        Self { changes }
    }

    /// Changes that revert this transition: each change inverted, in reverse order.
    pub fn inverse(&self) -> Transition {
        Transition {
            changes: self.changes.iter().rev().map(Change::inverse).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub sequence: u64,
    pub description: String,
    pub undo: Transition,
    pub redo: Transition,
}

impl LogEntry {
    pub fn from_changes(sequence: u64, description: impl Into<String>, changes: Vec<Change>) -> Self {
        let redo = Transition::new(changes);
        Self {
            sequence,
            description: description.into(),
            undo: redo.inverse(),
            redo,
        }
    }

    pub fn max_id(&self) -> u64 {
        self.redo.changes.iter().map(Change::max_id).max().unwrap_or(0)
    }

    /// Copy of this entry whose redo leaves every independent DOF it writes
    /// at the value `current` reports for it, rather than the value recorded
    /// when the entry was logged. Only the last write to each DOF is touched.
    /// `None` when no value differs.
    pub fn refreshed(&self, current: impl Fn(DofId) -> Option<f64>) -> Option<LogEntry> {
        let mut redo = self.redo.clone();
        let mut seen = HashSet::new();
        let mut changed = false;
        for change in redo.changes.iter_mut().rev() {
            let (id, value) = match change {
                Change::SetValue { id, to, .. } => (*id, to),
                Change::InsertDof { dof } => {
                    let id = dof.id;
                    match &mut dof.kind {
                        DofKind::Independent { value, .. } => (id, value),
                        DofKind::Dependent { .. } => continue,
                    }
                }
                Change::RedefineDof {
                    id,
                    to: DofKind::Independent { value, .. },
                    ..
                } => (*id, value),
                _ => continue,
            };
            if !seen.insert(id) {
                continue;
            }
            if let Some(now) = current(id) {
                if now.to_bits() != value.to_bits() {
                    *value = now;
                    changed = true;
                }
            }
        }
        changed.then(|| LogEntry {
            sequence: self.sequence,
            description: self.description.clone(),
            undo: redo.inverse(),
            redo,
        })
    }
}

/// Linear history with a cursor pointing just past the last applied entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationLog {
    entries: Vec<LogEntry>,
    cursor: usize,
    next_sequence: u64,
}

impl MutationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries. `cursor` is clamped to the entry count.
    pub fn from_entries(entries: Vec<LogEntry>, cursor: usize) -> Self {
        let next_sequence = entries.iter().map(|e| e.sequence + 1).max().unwrap_or(0);
        let cursor = cursor.min(entries.len());
        Self {
            entries,
            cursor,
            next_sequence,
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of applied entries.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    /// Append after the cursor, discarding any redo tail. Returns how many
    /// entries were discarded.
    pub fn push(&mut self, entry: LogEntry) -> usize {
        let discarded = self.entries.len() - self.cursor;
        self.entries.truncate(self.cursor);
        self.next_sequence = self.next_sequence.max(entry.sequence + 1);
        self.entries.push(entry);
        self.cursor = self.entries.len();
        discarded
    }

    /// Entry the next undo would revert.
    pub fn undo_target(&self) -> SketchResult<&LogEntry> {
        if self.cursor == 0 {
            return Err(SketchError::NothingToUndo);
        }
        Ok(&self.entries[self.cursor - 1])
    }

    /// Entry the next redo would re-apply.
    pub fn redo_target(&self) -> SketchResult<&LogEntry> {
        self.entries.get(self.cursor).ok_or(SketchError::NothingToRedo)
    }

    /// Overwrite the entry at `index` in place.
    pub fn replace(&mut self, index: usize, entry: LogEntry) {
        if let Some(slot) = self.entries.get_mut(index) {
            *slot = entry;
        }
    }

    pub fn set_cursor(&mut self, cursor: usize) {
        self.cursor = cursor.min(self.entries.len());
    }
}
