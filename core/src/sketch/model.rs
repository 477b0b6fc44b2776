//! The public face of the core: every edit goes through [`Model`], which
//! keeps the graph, the mutation log and the log store in step.

use super::constraints::ConstraintEquation;
use super::graph::Graph;
use super::loops::EdgeLoop;
use super::primitives::{Primitive, PrimitiveKind, SelectionMask};
use super::query::{self, Geometry};
use super::solver::{CancelToken, SketchSolver, SolveReport, SolverConfig};
use crate::dof::{Dof, DofKind};
use crate::error::{SketchError, SketchResult};
use crate::history::{Change, LogEntry, LogStore, MemoryStore, MutationLog};
use crate::ids::{ConstraintId, DofId, EntityRef, IdAllocator, PrimitiveId};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

pub struct Model {
    pub(crate) graph: Graph,
    pub(crate) ids: IdAllocator,
    log: MutationLog,
    store: Box<dyn LogStore>,
    config: SolverConfig,
    /// Changes of the open transaction, if any.
    recording: Option<Vec<Change>>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("graph", &self.graph)
            .field("ids", &self.ids)
            .field("log", &self.log)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Model {
    /// Empty model with an in-memory log.
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    /// Empty model persisting its log to `store`. The store is assumed empty.
    pub fn with_store(store: impl LogStore + 'static) -> Self {
        Self {
            graph: Graph::new(),
            ids: IdAllocator::new(),
            log: MutationLog::new(),
            store: Box::new(store),
            config: SolverConfig::default(),
            recording: None,
        }
    }

    /// Rebuild a model by replaying the applied part of a persisted log.
    pub fn restore(store: impl LogStore + 'static) -> SketchResult<Self> {
        let stored = store.load()?;
        let mut model = Self::with_store(store);
        let applied = stored.cursor.min(stored.entries.len());
        for entry in &stored.entries[..applied] {
            model.replay_entry(entry.clone())?;
        }
        for entry in &stored.entries {
            model.ids.advance_past(entry.max_id());
        }
        model.log = MutationLog::from_entries(stored.entries, applied);
        info!(
            "Restored model from {} log entries ({} applied)",
            model.log.len(),
            applied
        );
        Ok(model)
    }

    /// Apply an entry that is already persisted elsewhere and append it to
    /// the in-memory log without writing it to the store.
    pub fn replay_entry(&mut self, entry: LogEntry) -> SketchResult<()> {
        self.graph
            .apply_transition(&entry.redo)
            .map_err(|err| SketchError::Replay {
                sequence: entry.sequence,
                reason: err.to_string(),
            })?;
        self.ids.advance_past(entry.max_id());
        self.log.push(entry);
        Ok(())
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn log(&self) -> &MutationLog {
        &self.log
    }

    pub fn store(&self) -> &dyn LogStore {
        self.store.as_ref()
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SolverConfig) {
        self.config = config;
    }

    // ---------------------------------------------------------------------
    // Transactions
    // ---------------------------------------------------------------------

    /// Run `f` as one undoable step.
    ///
    /// Every change `f` makes is collected into a single log entry. If `f`
    /// fails, or the store refuses the entry, the graph is rolled back and
    /// nothing is logged. Nested calls join the outer transaction.
    pub fn transaction<T>(
        &mut self,
        description: &str,
        f: impl FnOnce(&mut Model) -> SketchResult<T>,
    ) -> SketchResult<T> {
        if self.recording.is_some() {
            return f(self);
        }
        self.recording = Some(Vec::new());
        let result = f(self);
        let changes = self.recording.take().unwrap_or_default();
        match result {
            Err(err) => {
                debug!("Rolling back '{}' ({} changes): {}", description, changes.len(), err);
                self.graph.revert(&changes);
                Err(err)
            }
            Ok(value) => {
                if !changes.is_empty() {
                    self.commit(description, changes)?;
                }
                Ok(value)
            }
        }
    }

    fn commit(&mut self, description: &str, changes: Vec<Change>) -> SketchResult<()> {
        let entry = LogEntry::from_changes(self.log.next_sequence(), description, changes);
        if let Err(err) = self.store.append_entry(self.log.cursor(), &entry) {
            warn!("Log store rejected '{}', rolling back: {}", description, err);
            self.graph.revert(&entry.redo.changes);
            return Err(err.into());
        }
        debug!("Logged '{}' as entry {}", description, entry.sequence);
        let discarded = self.log.push(entry);
        if discarded > 0 {
            debug!("Discarded {} redo entries", discarded);
        }
        Ok(())
    }

    /// Apply a change to the graph and add it to the open transaction.
    pub(crate) fn record(&mut self, change: Change) -> SketchResult<()> {
        if self.recording.is_none() {
            return self.transaction("edit", |m| m.record(change));
        }
        self.graph.apply(&change)?;
        if let Some(changes) = self.recording.as_mut() {
            changes.push(change);
        }
        Ok(())
    }

    pub(crate) fn new_dof(&mut self, kind: DofKind, owner: EntityRef) -> SketchResult<DofId> {
        let id = self.ids.dof();
        self.record(Change::InsertDof {
            dof: Dof {
                id,
                kind,
                owner: Some(owner),
            },
        })?;
        Ok(id)
    }

    pub(crate) fn insert_primitive(&mut self, id: PrimitiveId, kind: PrimitiveKind) -> SketchResult<PrimitiveId> {
        self.record(Change::InsertPrimitive {
            primitive: Primitive::new(id, kind),
        })?;
        Ok(id)
    }

    pub(crate) fn insert_constraint(&mut self, constraint: ConstraintEquation) -> SketchResult<ConstraintId> {
        let id = constraint.id;
        self.record(Change::InsertConstraint { constraint })?;
        Ok(id)
    }

    // ---------------------------------------------------------------------
    // Undo / redo
    // ---------------------------------------------------------------------

    pub fn can_undo(&self) -> bool {
        self.log.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.log.can_redo()
    }

    pub fn undo(&mut self) -> SketchResult<()> {
        self.ensure_idle()?;
        let entry = self.log.undo_target()?.clone();
        self.step_history(&entry, false)?;
        info!("Undo: {}", entry.description);
        Ok(())
    }

    pub fn redo(&mut self) -> SketchResult<()> {
        self.ensure_idle()?;
        let entry = self.log.redo_target()?.clone();
        self.step_history(&entry, true)?;
        info!("Redo: {}", entry.description);
        Ok(())
    }

    fn ensure_idle(&self) -> SketchResult<()> {
        if self.recording.is_some() {
            return Err(SketchError::InvalidValue(
                "undo/redo inside a transaction".to_string(),
            ));
        }
        Ok(())
    }

    fn step_history(&mut self, entry: &LogEntry, forward: bool) -> SketchResult<()> {
        // Values written by unlogged solves since the entry was recorded are
        // folded into its redo, so redo lands where undo started.
        let refreshed = if forward {
            None
        } else {
            let dofs = self.graph.dofs();
            entry.refreshed(|id| match &dofs.get(id).ok()?.kind {
                DofKind::Independent { value, .. } => Some(*value),
                DofKind::Dependent { .. } => None,
            })
        };
        let entry = refreshed.as_ref().unwrap_or(entry);
        let (apply, back, cursor) = if forward {
            (&entry.redo, &entry.undo, self.log.cursor() + 1)
        } else {
            (&entry.undo, &entry.redo, self.log.cursor() - 1)
        };
        self.graph
            .apply_transition(apply)
            .map_err(|err| SketchError::Replay {
                sequence: entry.sequence,
                reason: err.to_string(),
            })?;
        let stored = match &refreshed {
            Some(entry) => self.store.record_undo(cursor, entry),
            None => self.store.record_cursor(cursor),
        };
        if let Err(err) = stored {
            warn!("Log store rejected cursor move, restoring graph: {}", err);
            if let Err(back_err) = self.graph.apply_transition(back) {
                warn!("Failed to restore graph after store error: {}", back_err);
            }
            return Err(err.into());
        }
        if let Some(entry) = refreshed {
            debug!("Refreshed redo values of entry {}", entry.sequence);
            self.log.replace(cursor, entry);
        }
        self.log.set_cursor(cursor);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // DOF access
    // ---------------------------------------------------------------------

    pub fn dof(&self, id: DofId) -> SketchResult<&Dof> {
        self.graph.dofs().get(id)
    }

    pub fn value(&self, id: DofId) -> SketchResult<f64> {
        self.graph.value(id)
    }

    fn record_set_value(&mut self, id: DofId, value: f64) -> SketchResult<()> {
        let dof = self.graph.dofs().get(id)?;
        let DofKind::Independent { value: from, .. } = dof.kind else {
            return Err(SketchError::NotIndependent(id));
        };
        if from.to_bits() == value.to_bits() {
            return Ok(());
        }
        self.record(Change::SetValue { id, from, to: value })
    }

    /// Assign an independent DOF. Undoable.
    pub fn set_value(&mut self, id: DofId, value: f64) -> SketchResult<()> {
        self.transaction("Set value", |m| m.record_set_value(id, value))
    }

    /// Mark an independent DOF free (solver may move it) or fixed. Undoable.
    pub fn set_free(&mut self, id: DofId, free: bool) -> SketchResult<()> {
        self.transaction("Set free", |m| {
            let DofKind::Independent { free: from, .. } = m.graph.dofs().get(id)?.kind else {
                return Err(SketchError::NotIndependent(id));
            };
            if from == free {
                return Ok(());
            }
            m.record(Change::SetFree { id, from, to: free })
        })
    }

    /// Fix or free both coordinates of a Point2D.
    pub fn set_point_free(&mut self, point: PrimitiveId, free: bool) -> SketchResult<()> {
        let (s, t) = self.graph.point2d_dofs(point)?;
        self.transaction(if free { "Free point" } else { "Fix point" }, |m| {
            m.set_free(s, free)?;
            m.set_free(t, free)
        })
    }

    /// Reposition annotation text. `label` must be a label DOF of some
    /// primitive or constraint. Undoable.
    pub fn move_label(&mut self, label: DofId, value: f64) -> SketchResult<()> {
        let is_label = self.graph.primitives().any(|p| p.kind.label_dofs().contains(&label))
            || self.graph.constraints().any(|c| c.kind.label_dofs().contains(&label));
        if !is_label {
            return Err(SketchError::InvalidValue(format!("{} is not a label DOF", label)));
        }
        self.transaction("Move label", |m| m.record_set_value(label, value))
    }

    // ---------------------------------------------------------------------
    // Constraint edits
    // ---------------------------------------------------------------------

    fn update_constraint(
        &mut self,
        description: &str,
        id: ConstraintId,
        edit: impl FnOnce(&mut ConstraintEquation),
    ) -> SketchResult<()> {
        let from = self.graph.constraint(id)?.clone();
        let mut to = from.clone();
        edit(&mut to);
        if to == from {
            return Ok(());
        }
        self.transaction(description, |m| m.record(Change::UpdateConstraint { from, to }))
    }

    pub fn set_weight(&mut self, id: ConstraintId, weight: f64) -> SketchResult<()> {
        if !(weight.is_finite() && weight > 0.0) {
            return Err(SketchError::InvalidValue(format!("weight must be positive, got {}", weight)));
        }
        self.update_constraint("Set weight", id, |c| c.weight = weight)
    }

    /// Suppressed constraints are kept but ignored by the solver.
    pub fn set_suppressed(&mut self, id: ConstraintId, suppressed: bool) -> SketchResult<()> {
        self.update_constraint(
            if suppressed { "Suppress constraint" } else { "Unsuppress constraint" },
            id,
            |c| c.suppressed = suppressed,
        )
    }

    /// Set the dimension value (distance or angle) of a constraint.
    pub fn set_dimension(&mut self, id: ConstraintId, value: f64) -> SketchResult<()> {
        let dof = self
            .graph
            .constraint(id)?
            .kind
            .value_dof()
            .ok_or_else(|| SketchError::InvalidValue(format!("{} has no dimension", id)))?;
        self.transaction("Set dimension", |m| m.record_set_value(dof, value))
    }

    // ---------------------------------------------------------------------
    // DOF replacement
    // ---------------------------------------------------------------------

    /// Make everything that reads `old` read `new` instead, then drop DOFs
    /// nothing refers to any more. Undoable.
    pub fn replace_dof(&mut self, old: DofId, new: DofId) -> SketchResult<()> {
        self.graph.dofs().get(old)?;
        self.graph.dofs().get(new)?;
        if old == new {
            return Ok(());
        }
        self.transaction("Replace DOF", |m| {
            let readers: Vec<DofId> = m.graph.dofs().direct_dependents(old).collect();
            for reader in readers {
                let from = m.graph.dofs().get(reader)?.kind.clone();
                let to = match &from {
                    DofKind::Dependent { function, inputs } => DofKind::Dependent {
                        function: *function,
                        inputs: inputs.iter().map(|i| if *i == old { new } else { *i }).collect(),
                    },
                    DofKind::Independent { .. } => continue,
                };
                m.record(Change::RedefineDof { id: reader, from, to })?;
            }

            let (prims, cons) = m.graph.dof_users(old);
            for id in prims {
                let from = m.graph.primitive(id)?.clone();
                let mut to = from.clone();
                to.kind.replace_dof(old, new);
                m.record(Change::UpdatePrimitive { from, to })?;
            }
            for id in cons {
                let from = m.graph.constraint(id)?.clone();
                let mut to = from.clone();
                to.replace_dof(old, new);
                m.record(Change::UpdateConstraint { from, to })?;
            }
            m.collect_garbage()
        })
    }

    /// Make two Point2Ds coincident by sharing DOFs. `drop` ends up reading
    /// the DOFs of `keep` and is deleted if nothing refers to it.
    ///
    /// If only one of the points has computed coordinates (an arc end), that
    /// one is kept so the arc stays intact.
    pub fn merge_points(&mut self, keep: PrimitiveId, drop: PrimitiveId) -> SketchResult<PrimitiveId> {
        if keep == drop {
            return Ok(keep);
        }
        let keep_plane = self.graph.plane_of(keep)?;
        if keep_plane != self.graph.plane_of(drop)? {
            return Err(SketchError::InvalidValue(format!(
                "{} and {} lie on different planes",
                keep, drop
            )));
        }
        let computed = |m: &Model, p: PrimitiveId| -> SketchResult<bool> {
            let (s, t) = m.graph.point2d_dofs(p)?;
            Ok(!m.graph.dofs().get(s)?.is_independent() || !m.graph.dofs().get(t)?.is_independent())
        };
        let (keep, drop) = match (computed(self, keep)?, computed(self, drop)?) {
            (true, true) => {
                return Err(SketchError::InvalidValue(format!(
                    "{} and {} are both computed points",
                    keep, drop
                )))
            }
            (false, true) => (drop, keep),
            _ => (keep, drop),
        };
        let (ks, kt) = self.graph.point2d_dofs(keep)?;
        let (ds, dt) = self.graph.point2d_dofs(drop)?;

        self.transaction("Merge points", |m| {
            m.replace_dof(ds, ks)?;
            m.replace_dof(dt, kt)?;
            let (prims, cons) = m.graph.referrers(drop);
            if prims.is_empty() && cons.is_empty() {
                let primitive = m.graph.primitive(drop)?.clone();
                m.record(Change::RemovePrimitive { primitive })?;
                m.collect_garbage()?;
            }
            Ok(keep)
        })
    }

    // ---------------------------------------------------------------------
    // Deletion
    // ---------------------------------------------------------------------

    /// Delete a primitive with everything that depends on it. One undo step.
    pub fn delete_primitive(&mut self, id: PrimitiveId) -> SketchResult<()> {
        self.delete_many(&[id], &[])
    }

    pub fn delete_constraint(&mut self, id: ConstraintId) -> SketchResult<()> {
        self.delete_many(&[], &[id])
    }

    /// Delete a selection as a single undo step, cascading to dependents.
    pub fn delete_many(&mut self, primitives: &[PrimitiveId], constraints: &[ConstraintId]) -> SketchResult<()> {
        let doomed = self.cascade(primitives)?;
        let mut doomed_constraints: BTreeSet<ConstraintId> = BTreeSet::new();
        for id in constraints {
            self.graph.constraint(*id)?;
            doomed_constraints.insert(*id);
        }
        for constraint in self.graph.constraints() {
            if constraint.depends_on.iter().any(|p| doomed.contains(p)) {
                doomed_constraints.insert(constraint.id);
            }
        }
        let order = self.deletion_order(&doomed);

        info!(
            "Deleting {} primitives and {} constraints",
            order.len(),
            doomed_constraints.len()
        );
        self.transaction("Delete", |m| {
            for id in doomed_constraints {
                let constraint = m.graph.constraint(id)?.clone();
                m.record(Change::RemoveConstraint { constraint })?;
            }
            for id in order {
                let primitive = m.graph.primitive(id)?.clone();
                m.record(Change::RemovePrimitive { primitive })?;
            }
            m.collect_garbage()
        })
    }

    /// `roots` plus every primitive that depends on them, transitively,
    /// plus the points generated by any arc or circle in the set.
    fn cascade(&self, roots: &[PrimitiveId]) -> SketchResult<BTreeSet<PrimitiveId>> {
        let mut doomed = BTreeSet::new();
        let mut stack = roots.to_vec();
        while let Some(id) = stack.pop() {
            let primitive = self.graph.primitive(id)?;
            if !doomed.insert(id) {
                continue;
            }
            stack.extend(primitive.kind.generated());
            stack.extend(self.graph.referrers(id).0);
        }
        Ok(doomed)
    }

    /// Dependents before the primitives they depend on.
    fn deletion_order(&self, doomed: &BTreeSet<PrimitiveId>) -> Vec<PrimitiveId> {
        fn visit(
            graph: &Graph,
            id: PrimitiveId,
            doomed: &BTreeSet<PrimitiveId>,
            seen: &mut HashSet<PrimitiveId>,
            order: &mut Vec<PrimitiveId>,
        ) {
            if !seen.insert(id) {
                return;
            }
            for referrer in graph.referrers(id).0 {
                if doomed.contains(&referrer) {
                    visit(graph, referrer, doomed, seen, order);
                }
            }
            order.push(id);
        }

        let mut seen = HashSet::new();
        let mut order = Vec::with_capacity(doomed.len());
        for id in doomed {
            visit(&self.graph, *id, doomed, &mut seen, &mut order);
        }
        order
    }

    /// Remove DOFs no live primitive or constraint can reach.
    fn collect_garbage(&mut self) -> SketchResult<()> {
        for id in self.graph.orphan_dofs() {
            let dof = self.graph.dofs().get(id)?.clone();
            self.record(Change::RemoveDof { dof })?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Solving
    // ---------------------------------------------------------------------

    /// Solve with the model's config. Write-back is not logged.
    pub fn solve(&mut self) -> SketchResult<SolveReport> {
        let config = self.config.clone();
        self.solve_with(&config, &CancelToken::new())
    }

    pub fn solve_with(&mut self, config: &SolverConfig, cancel: &CancelToken) -> SketchResult<SolveReport> {
        SketchSolver::solve(&mut self.graph, config, cancel)
    }

    /// Move independent DOFs to new values and re-solve with them held in
    /// place. Logged as one undoable step covering the dragged values and
    /// every value the solver moved.
    pub fn drag(&mut self, targets: &[(DofId, f64)], cancel: &CancelToken) -> SketchResult<SolveReport> {
        let config = self.config.clone();
        self.transaction("Drag", |m| {
            for (id, value) in targets {
                m.record_set_value(*id, *value)?;
            }

            let mut pinned = Vec::new();
            for (id, _) in targets {
                if m.graph.dofs().get(*id)?.is_free() {
                    m.graph.dofs_mut().set_free(*id, false)?;
                    pinned.push(*id);
                }
            }
            let solved = SketchSolver::free_variables(&m.graph).and_then(|free| {
                let before = m.graph.dofs().values(&free)?;
                let report = SketchSolver::solve(&mut m.graph, &config, cancel)?;
                Ok((free, before, report))
            });
            for id in pinned {
                m.graph.dofs_mut().set_free(id, true)?;
            }
            let (free, before, report) = solved?;

            for (id, from) in free.into_iter().zip(before) {
                let to = m.graph.value(id)?;
                if to.to_bits() != from.to_bits() {
                    if let Some(changes) = m.recording.as_mut() {
                        changes.push(Change::SetValue { id, from, to });
                    }
                }
            }
            Ok(report)
        })
    }

    /// Drag a Point2D to `(s, t)`.
    pub fn drag_point(&mut self, point: PrimitiveId, s: f64, t: f64, cancel: &CancelToken) -> SketchResult<SolveReport> {
        let (s_dof, t_dof) = self.graph.point2d_dofs(point)?;
        self.drag(&[(s_dof, s), (t_dof, t)], cancel)
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn primitive(&self, id: PrimitiveId) -> SketchResult<&Primitive> {
        self.graph.primitive(id)
    }

    pub fn constraint(&self, id: ConstraintId) -> SketchResult<&ConstraintEquation> {
        self.graph.constraint(id)
    }

    pub fn primitive_dofs(&self, id: PrimitiveId) -> SketchResult<Vec<DofId>> {
        Ok(self.graph.primitive(id)?.dofs())
    }

    pub fn primitive_dependencies(&self, id: PrimitiveId) -> SketchResult<Vec<PrimitiveId>> {
        Ok(self.graph.primitive(id)?.depends_on())
    }

    pub fn constraint_dofs(&self, id: ConstraintId) -> SketchResult<Vec<DofId>> {
        Ok(self.graph.constraint(id)?.dofs.clone())
    }

    pub fn constraint_dependencies(&self, id: ConstraintId) -> SketchResult<Vec<PrimitiveId>> {
        Ok(self.graph.constraint(id)?.depends_on.clone())
    }

    /// Primitives whose selection mask intersects `mask`; constraints are
    /// included when `mask` has the constraint bit.
    pub fn select(&self, mask: SelectionMask) -> (Vec<PrimitiveId>, Vec<ConstraintId>) {
        let prims = self
            .graph
            .primitives()
            .filter(|p| mask.intersects(p.selection_mask()))
            .map(|p| p.id)
            .collect();
        let cons = if mask.intersects(SelectionMask::CONSTRAINT) {
            self.graph.constraints().map(|c| c.id).collect()
        } else {
            Vec::new()
        };
        (prims, cons)
    }

    pub fn geometry(&self, id: PrimitiveId) -> SketchResult<Geometry> {
        query::resolve(&self.graph, id)
    }

    pub fn constraint_error(&self, id: ConstraintId) -> SketchResult<f64> {
        query::constraint_error(&self.graph, self.graph.constraint(id)?)
    }

    pub fn is_loop_valid(&self, edges: &[PrimitiveId]) -> bool {
        EdgeLoop::new(edges.to_vec()).is_loop_valid(&self.graph)
    }
}
