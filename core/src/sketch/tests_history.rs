//! Undo, redo, drag history and store failure handling.

use super::*;
use crate::error::{SketchError, StoreError};
use crate::history::{LogEntry, LogStore, MemoryStore, StoredLog};
use crate::ids::PrimitiveId;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Memory store that can be told to refuse writes. Clones share state.
#[derive(Clone, Default)]
struct FlakyStore {
    inner: Arc<Mutex<MemoryStore>>,
    fail: Arc<AtomicBool>,
}

impl FlakyStore {
    fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn check(&self, sequence: u64) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected {
                sequence,
                reason: "disk full".to_string(),
            });
        }
        Ok(())
    }
}

impl LogStore for FlakyStore {
    fn append_entry(&mut self, position: usize, entry: &LogEntry) -> Result<(), StoreError> {
        self.check(entry.sequence)?;
        self.inner.lock().unwrap().append_entry(position, entry)
    }

    fn record_cursor(&mut self, cursor: usize) -> Result<(), StoreError> {
        self.check(cursor as u64)?;
        self.inner.lock().unwrap().record_cursor(cursor)
    }

    fn record_undo(&mut self, position: usize, entry: &LogEntry) -> Result<(), StoreError> {
        self.check(entry.sequence)?;
        self.inner.lock().unwrap().record_undo(position, entry)
    }

    fn load(&self) -> Result<StoredLog, StoreError> {
        self.inner.lock().unwrap().load()
    }
}

fn two_points(model: &mut Model) -> (PrimitiveId, PrimitiveId, PrimitiveId) {
    let plane = model.add_xy_plane().unwrap();
    let a = model.add_point2d(plane, 0.0, 0.0, true).unwrap();
    let b = model.add_point2d(plane, 3.0, 4.0, true).unwrap();
    (plane, a, b)
}

#[test]
fn test_undo_redo_restore_exact_states() {
    let mut model = Model::new();
    let mut states = vec![model.graph().clone()];
    let mut snap = |model: &Model| states.push(model.graph().clone());

    let plane = model.add_xy_plane().unwrap();
    snap(&model);
    let a = model.add_point2d(plane, 0.0, 0.0, true).unwrap();
    snap(&model);
    let b = model.add_point2d(plane, 3.0, 1.0, true).unwrap();
    snap(&model);
    let line = model.add_line2d(a, b).unwrap();
    snap(&model);
    let horizontal = model.add_hori_vert_line2d(line, false).unwrap();
    snap(&model);
    model.add_distance_point2d(a, b, Some(0.1 + 0.2)).unwrap();
    snap(&model);
    let (s, _) = model.graph().point2d_dofs(b).unwrap();
    model.set_value(s, std::f64::consts::PI).unwrap();
    snap(&model);
    model.set_weight(horizontal, 4.0).unwrap();
    snap(&model);
    model.delete_primitive(a).unwrap();
    snap(&model);

    let steps = states.len() - 1;
    assert_eq!(model.log().len(), steps);
    for expected in states.iter().rev().skip(1) {
        model.undo().unwrap();
        assert_eq!(model.graph(), expected);
    }
    assert!(!model.can_undo());
    for expected in states.iter().skip(1) {
        model.redo().unwrap();
        assert_eq!(model.graph(), expected);
    }
    assert!(!model.can_redo());
}

#[test]
fn test_empty_history() {
    let mut model = Model::new();
    let err = model.undo().unwrap_err();
    assert!(matches!(err, SketchError::NothingToUndo));
    assert!(err.is_informational());
    assert!(matches!(model.redo(), Err(SketchError::NothingToRedo)));
}

#[test]
fn test_new_edit_discards_redo_tail() {
    let store = FlakyStore::default();
    let mut model = Model::with_store(store.clone());
    let (plane, _, _) = two_points(&mut model);
    model.undo().unwrap();
    model.undo().unwrap();
    assert!(model.can_redo());

    model.add_point2d(plane, 9.0, 9.0, true).unwrap();
    assert!(!model.can_redo());
    assert_eq!(model.log().len(), 2);
    assert_eq!(model.log().cursor(), 2);

    let stored = store.load().unwrap();
    assert_eq!(stored.entries, model.log().entries());
    assert_eq!(stored.cursor, 2);
}

#[test]
fn test_store_failure_rolls_back_edit() {
    let store = FlakyStore::default();
    let mut model = Model::with_store(store.clone());
    let (plane, a, _) = two_points(&mut model);
    let before = model.graph().clone();

    store.set_failing(true);
    let err = model.add_point2d(plane, 1.0, 1.0, true).unwrap_err();
    assert_eq!(err.code(), "STORE");
    assert_eq!(model.graph(), &before);
    assert_eq!(model.log().len(), 3);
    assert_eq!(store.load().unwrap().entries.len(), 3);

    // Multi-change edits roll back as a whole
    assert!(model.delete_primitive(a).is_err());
    assert_eq!(model.graph(), &before);
}

#[test]
fn test_store_failure_on_undo_keeps_state() {
    let store = FlakyStore::default();
    let mut model = Model::with_store(store.clone());
    two_points(&mut model);
    let before = model.graph().clone();

    store.set_failing(true);
    assert!(matches!(model.undo(), Err(SketchError::Store(_))));
    assert_eq!(model.graph(), &before);
    assert_eq!(model.log().cursor(), 3);

    store.set_failing(false);
    model.undo().unwrap();
    assert_eq!(store.load().unwrap().cursor, 2);
}

#[test]
fn test_redo_after_solve_restores_solved_values() {
    let store = FlakyStore::default();
    let mut model = Model::with_store(store.clone());
    let (_, a, b) = two_points(&mut model);
    model.set_point_free(a, false).unwrap();
    model.add_distance_point2d(a, b, Some(10.0)).unwrap();
    let (bs, _) = model.graph().point2d_dofs(b).unwrap();
    model.set_value(bs, 1.0).unwrap();
    assert!(model.solve().unwrap().is_converged());
    let before_undo = model.graph().clone();

    model.undo().unwrap();
    assert_eq!(model.value(bs).unwrap(), 3.0);
    model.redo().unwrap();
    assert_eq!(model.graph(), &before_undo);

    // The rewritten entry is what a restore replays
    let restored = Model::restore(store.clone()).unwrap();
    assert_eq!(restored.graph(), &before_undo);
    assert_eq!(store.load().unwrap().entries, model.log().entries());
}

#[test]
fn test_redo_of_insert_after_solve_restores_solved_point() {
    let mut model = Model::new();
    let (_, a, b) = two_points(&mut model);
    model.set_point_free(a, false).unwrap();
    model.transaction("Dimensioned point", |m| {
        m.add_distance_point2d(a, b, Some(2.0))?;
        Ok(())
    })
    .unwrap();
    model.solve().unwrap();
    let before_undo = model.graph().clone();

    model.undo().unwrap();
    model.redo().unwrap();
    assert_eq!(model.graph(), &before_undo);

    // Undo every step and redo them all
    while model.can_undo() {
        model.undo().unwrap();
    }
    while model.can_redo() {
        model.redo().unwrap();
    }
    assert_eq!(model.graph(), &before_undo);
}

#[test]
fn test_store_failure_on_refreshing_undo_keeps_state() {
    let store = FlakyStore::default();
    let mut model = Model::with_store(store.clone());
    let (_, a, b) = two_points(&mut model);
    model.set_point_free(a, false).unwrap();
    model.add_distance_point2d(a, b, Some(10.0)).unwrap();
    let (bs, _) = model.graph().point2d_dofs(b).unwrap();
    model.set_value(bs, 1.0).unwrap();
    model.solve().unwrap();
    let before = model.graph().clone();
    let entries = model.log().entries().to_vec();

    store.set_failing(true);
    assert!(matches!(model.undo(), Err(SketchError::Store(_))));
    assert_eq!(model.graph(), &before);
    assert_eq!(model.log().entries(), &entries[..]);
}

#[test]
fn test_drag_is_one_undoable_step() {
    let mut model = Model::new();
    let (_, a, b) = two_points(&mut model);
    model.add_distance_point2d(a, b, None).unwrap();
    let before = model.graph().clone();
    let logged = model.log().len();

    let report = model.drag_point(b, 10.0, 0.0, &CancelToken::new()).unwrap();
    assert!(report.is_converged());
    assert_eq!(model.log().len(), logged + 1);
    assert_eq!(query::point2d(model.graph(), b).unwrap(), [10.0, 0.0]);
    let [s, t] = query::point2d(model.graph(), a).unwrap();
    assert!((((s - 10.0).powi(2) + t * t).sqrt() - 5.0).abs() < 1e-8);

    // Dragged DOFs are free again afterwards
    let (bs, bt) = model.graph().point2d_dofs(b).unwrap();
    assert!(model.dof(bs).unwrap().is_free() && model.dof(bt).unwrap().is_free());
    let after = model.graph().clone();

    model.undo().unwrap();
    assert_eq!(model.graph(), &before);
    model.redo().unwrap();
    assert_eq!(model.graph(), &after);
}

#[test]
fn test_drag_of_computed_point_is_rejected() {
    let mut model = Model::new();
    let plane = model.add_xy_plane().unwrap();
    let arc = model.add_arc2d(plane, [0.0, 0.0], 1.0, 0.0, 1.0, true).unwrap();
    let end = model.graph().edge_endpoint(arc, EdgeEnd::Point2).unwrap();
    let logged = model.log().len();

    let err = model.drag_point(end, 2.0, 2.0, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, SketchError::NotIndependent(_)));
    assert_eq!(model.log().len(), logged);
}

#[test]
fn test_cancelled_drag_keeps_dragged_values() {
    let mut model = Model::new();
    let (_, a, b) = two_points(&mut model);
    model.add_distance_point2d(a, b, None).unwrap();

    let token = CancelToken::new();
    token.cancel();
    let report = model.drag_point(b, 6.0, 8.0, &token).unwrap();
    assert_eq!(report.status, SolveStatus::Cancelled);
    assert_eq!(query::point2d(model.graph(), b).unwrap(), [6.0, 8.0]);
    assert_eq!(query::point2d(model.graph(), a).unwrap(), [0.0, 0.0]);
}

#[test]
fn test_restore_replays_to_cursor() {
    let store = FlakyStore::default();
    let mut model = Model::with_store(store.clone());
    let (plane, a, b) = two_points(&mut model);
    model.add_distance_point2d(a, b, Some(7.5)).unwrap();
    model.undo().unwrap();
    let expected = model.graph().clone();

    let mut restored = Model::restore(store.clone()).unwrap();
    assert_eq!(restored.graph(), &expected);
    assert_eq!(restored.log().cursor(), 3);
    assert!(restored.can_redo());

    restored.redo().unwrap();
    model.redo().unwrap();
    assert_eq!(restored.graph(), model.graph());

    // Fresh ids never collide with logged ones, applied or not
    let fresh = restored.add_point2d(plane, 1.0, 1.0, true).unwrap();
    assert!(fresh.raw() > model.graph().max_id());
}
