//! The constraint graph: DOF arena plus live primitives and constraints.

use super::constraints::ConstraintEquation;
use super::primitives::{EdgeEnd, Primitive, PrimitiveKind};
use crate::dof::{Dof, DofStore};
use crate::error::{SketchError, SketchResult};
use crate::history::{Change, Transition};
use crate::ids::{ConstraintId, DofId, PrimitiveId};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    dofs: DofStore,
    primitives: BTreeMap<PrimitiveId, Primitive>,
    constraints: BTreeMap<ConstraintId, ConstraintEquation>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dofs(&self) -> &DofStore {
        &self.dofs
    }

    /// Direct access for value write-back. Structural edits go through [`Graph::apply`].
    pub(crate) fn dofs_mut(&mut self) -> &mut DofStore {
        &mut self.dofs
    }

    pub fn value(&self, id: DofId) -> SketchResult<f64> {
        self.dofs.value(id)
    }

    pub fn primitive(&self, id: PrimitiveId) -> SketchResult<&Primitive> {
        self.primitives.get(&id).ok_or(SketchError::UnknownPrimitive(id))
    }

    pub fn constraint(&self, id: ConstraintId) -> SketchResult<&ConstraintEquation> {
        self.constraints.get(&id).ok_or(SketchError::UnknownConstraint(id))
    }

    pub fn primitives(&self) -> impl Iterator<Item = &Primitive> {
        self.primitives.values()
    }

    pub fn constraints(&self) -> impl Iterator<Item = &ConstraintEquation> {
        self.constraints.values()
    }

    pub fn contains_primitive(&self, id: PrimitiveId) -> bool {
        self.primitives.contains_key(&id)
    }

    pub fn contains_constraint(&self, id: ConstraintId) -> bool {
        self.constraints.contains_key(&id)
    }

    /// Largest id in use, across all three id spaces.
    pub fn max_id(&self) -> u64 {
        let dof = self.dofs.iter().map(|d| d.id.raw()).max().unwrap_or(0);
        let prim = self.primitives.keys().map(|id| id.raw()).max().unwrap_or(0);
        let con = self.constraints.keys().map(|id| id.raw()).max().unwrap_or(0);
        dof.max(prim).max(con)
    }

    // ---------------------------------------------------------------------
    // Typed lookups
    // ---------------------------------------------------------------------

    pub fn point2d_dofs(&self, id: PrimitiveId) -> SketchResult<(DofId, DofId)> {
        match self.primitive(id)?.kind {
            PrimitiveKind::Point2D { s, t, .. } => Ok((s, t)),
            ref other => Err(wrong_kind(id, "point2d", other)),
        }
    }

    /// `(point1, point2, [s1, t1, s2, t2])` of a Line2D.
    pub fn line2d(&self, id: PrimitiveId) -> SketchResult<(PrimitiveId, PrimitiveId, [DofId; 4])> {
        match self.primitive(id)?.kind {
            PrimitiveKind::Line2D {
                point1,
                point2,
                s1,
                t1,
                s2,
                t2,
                ..
            } => Ok((point1, point2, [s1, t1, s2, t2])),
            ref other => Err(wrong_kind(id, "line2d", other)),
        }
    }

    /// Sketch plane a 2D primitive lives on.
    pub fn plane_of(&self, id: PrimitiveId) -> SketchResult<PrimitiveId> {
        let primitive = self.primitive(id)?;
        primitive
            .kind
            .plane()
            .ok_or_else(|| wrong_kind(id, "2d primitive", &primitive.kind))
    }

    pub fn expect_plane(&self, id: PrimitiveId) -> SketchResult<()> {
        match self.primitive(id)?.kind {
            PrimitiveKind::SketchPlane { .. } => Ok(()),
            ref other => Err(wrong_kind(id, "sketch_plane", other)),
        }
    }

    /// The Point2D at one end of a Line2D or Arc2D.
    pub fn edge_endpoint(&self, edge: PrimitiveId, end: EdgeEnd) -> SketchResult<PrimitiveId> {
        match self.primitive(edge)?.kind {
            PrimitiveKind::Line2D { point1, point2, .. } | PrimitiveKind::Arc2D { point1, point2, .. } => {
                Ok(match end {
                    EdgeEnd::Point1 => point1,
                    EdgeEnd::Point2 => point2,
                })
            }
            ref other => Err(wrong_kind(edge, "edge", other)),
        }
    }

    pub fn endpoint_dofs(&self, edge: PrimitiveId, end: EdgeEnd) -> SketchResult<(DofId, DofId)> {
        self.point2d_dofs(self.edge_endpoint(edge, end)?)
    }

    /// Identity test: both coordinates are the very same DOFs.
    pub fn endpoints_coincide(
        &self,
        a: (PrimitiveId, EdgeEnd),
        b: (PrimitiveId, EdgeEnd),
    ) -> SketchResult<bool> {
        Ok(self.endpoint_dofs(a.0, a.1)? == self.endpoint_dofs(b.0, b.1)?)
    }

    // ---------------------------------------------------------------------
    // Reference queries
    // ---------------------------------------------------------------------

    /// Primitives and constraints that list `id` as a direct dependency.
    pub fn referrers(&self, id: PrimitiveId) -> (Vec<PrimitiveId>, Vec<ConstraintId>) {
        let prims = self
            .primitives
            .values()
            .filter(|p| p.depends_on().contains(&id))
            .map(|p| p.id)
            .collect();
        let cons = self
            .constraints
            .values()
            .filter(|c| c.depends_on.contains(&id))
            .map(|c| c.id)
            .collect();
        (prims, cons)
    }

    /// Primitives and constraints whose DOF lists mention `dof`.
    pub fn dof_users(&self, dof: DofId) -> (Vec<PrimitiveId>, Vec<ConstraintId>) {
        let prims = self
            .primitives
            .values()
            .filter(|p| p.dofs().contains(&dof))
            .map(|p| p.id)
            .collect();
        let cons = self
            .constraints
            .values()
            .filter(|c| c.dofs.contains(&dof) || c.residual.inputs.contains(&dof))
            .map(|c| c.id)
            .collect();
        (prims, cons)
    }

    /// Every DOF reachable from a live primitive or constraint, including
    /// the inputs of dependent DOFs.
    pub fn referenced_dofs(&self) -> HashSet<DofId> {
        let mut stack: Vec<DofId> = self
            .primitives
            .values()
            .flat_map(|p| p.dofs())
            .chain(
                self.constraints
                    .values()
                    .flat_map(|c| c.dofs.iter().chain(c.residual.inputs.iter()).copied()),
            )
            .collect();
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Ok(dof) = self.dofs.get(id) {
                stack.extend(dof.kind.inputs().iter().copied());
            }
        }
        seen
    }

    /// DOFs not reachable from any primitive or constraint, ordered so that
    /// each one comes before the DOFs it reads.
    pub fn orphan_dofs(&self) -> Vec<DofId> {
        let used = self.referenced_dofs();
        let orphans: BTreeSet<DofId> = self
            .dofs
            .iter()
            .map(|d| d.id)
            .filter(|id| !used.contains(id))
            .collect();

        let mut ordered = Vec::with_capacity(orphans.len());
        let mut placed = HashSet::new();
        let mut visiting = HashSet::new();
        for id in &orphans {
            self.place_readers_first(*id, &orphans, &mut placed, &mut visiting, &mut ordered);
        }
        ordered
    }

    fn place_readers_first(
        &self,
        id: DofId,
        orphans: &BTreeSet<DofId>,
        placed: &mut HashSet<DofId>,
        visiting: &mut HashSet<DofId>,
        ordered: &mut Vec<DofId>,
    ) {
        if placed.contains(&id) || !visiting.insert(id) {
            return;
        }
        let readers: Vec<DofId> = self.dofs.direct_dependents(id).collect();
        for reader in readers {
            if orphans.contains(&reader) {
                self.place_readers_first(reader, orphans, placed, visiting, ordered);
            }
        }
        visiting.remove(&id);
        placed.insert(id);
        ordered.push(id);
    }

    // ---------------------------------------------------------------------
    // Structural edits
    // ---------------------------------------------------------------------

    fn check_primitive(&self, primitive: &Primitive) -> SketchResult<()> {
        for dof in primitive.dofs() {
            if !self.dofs.contains(dof) {
                return Err(SketchError::UnknownDof(dof));
            }
        }
        for dep in primitive.depends_on() {
            if dep != primitive.id && !self.primitives.contains_key(&dep) {
                return Err(SketchError::UnknownPrimitive(dep));
            }
        }
        Ok(())
    }

    fn check_constraint(&self, constraint: &ConstraintEquation) -> SketchResult<()> {
        if !(constraint.weight.is_finite() && constraint.weight > 0.0) {
            return Err(SketchError::InvalidValue(format!(
                "{} weight must be positive, got {}",
                constraint.id, constraint.weight
            )));
        }
        if !constraint.residual_aligned() {
            return Err(SketchError::InvalidValue(format!(
                "{} residual inputs are not an ordered subset of its DOFs",
                constraint.id
            )));
        }
        let function = constraint.residual.function;
        if constraint.residual.inputs.len() != function.arity() {
            return Err(SketchError::Arity {
                function: function.name(),
                expected: function.arity(),
                found: constraint.residual.inputs.len(),
            });
        }
        for dof in &constraint.dofs {
            if !self.dofs.contains(*dof) {
                return Err(SketchError::UnknownDof(*dof));
            }
        }
        for dep in &constraint.depends_on {
            if !self.primitives.contains_key(dep) {
                return Err(SketchError::UnknownPrimitive(*dep));
            }
        }
        Ok(())
    }

    fn insert_primitive(&mut self, primitive: Primitive) -> SketchResult<()> {
        if self.primitives.contains_key(&primitive.id) {
            return Err(SketchError::InvalidValue(format!("{} already exists", primitive.id)));
        }
        self.check_primitive(&primitive)?;
        self.primitives.insert(primitive.id, primitive);
        Ok(())
    }

    fn remove_primitive(&mut self, id: PrimitiveId) -> SketchResult<Primitive> {
        let (prims, cons) = self.referrers(id);
        if let Some(p) = prims.into_iter().find(|p| *p != id) {
            return Err(SketchError::ReferentialIntegrity {
                entity: id.to_string(),
                referenced_by: p.to_string(),
            });
        }
        if let Some(c) = cons.first() {
            return Err(SketchError::ReferentialIntegrity {
                entity: id.to_string(),
                referenced_by: c.to_string(),
            });
        }
        self.primitives.remove(&id).ok_or(SketchError::UnknownPrimitive(id))
    }

    fn update_primitive(&mut self, primitive: Primitive) -> SketchResult<()> {
        if !self.primitives.contains_key(&primitive.id) {
            return Err(SketchError::UnknownPrimitive(primitive.id));
        }
        self.check_primitive(&primitive)?;
        self.primitives.insert(primitive.id, primitive);
        Ok(())
    }

    fn insert_constraint(&mut self, constraint: ConstraintEquation) -> SketchResult<()> {
        if self.constraints.contains_key(&constraint.id) {
            return Err(SketchError::InvalidValue(format!("{} already exists", constraint.id)));
        }
        self.check_constraint(&constraint)?;
        self.constraints.insert(constraint.id, constraint);
        Ok(())
    }

    fn update_constraint(&mut self, constraint: ConstraintEquation) -> SketchResult<()> {
        if !self.constraints.contains_key(&constraint.id) {
            return Err(SketchError::UnknownConstraint(constraint.id));
        }
        self.check_constraint(&constraint)?;
        self.constraints.insert(constraint.id, constraint);
        Ok(())
    }

    fn insert_dof(&mut self, dof: Dof) -> SketchResult<()> {
        self.dofs.insert(dof)
    }

    fn remove_dof(&mut self, id: DofId) -> SketchResult<Dof> {
        let (prims, cons) = self.dof_users(id);
        let user = prims
            .first()
            .map(ToString::to_string)
            .or_else(|| cons.first().map(ToString::to_string));
        if let Some(user) = user {
            return Err(SketchError::ReferentialIntegrity {
                entity: id.to_string(),
                referenced_by: user,
            });
        }
        self.dofs.remove(id)
    }

    /// Apply one change.
    pub fn apply(&mut self, change: &Change) -> SketchResult<()> {
        match change {
            Change::InsertDof { dof } => self.insert_dof(dof.clone()),
            Change::RemoveDof { dof } => self.remove_dof(dof.id).map(|_| ()),
            Change::RedefineDof { id, to, .. } => self.dofs.redefine(*id, to.clone()).map(|_| ()),
            Change::SetValue { id, to, .. } => self.dofs.set_value(*id, *to).map(|_| ()),
            Change::SetFree { id, to, .. } => self.dofs.set_free(*id, *to).map(|_| ()),
            Change::InsertPrimitive { primitive } => self.insert_primitive(primitive.clone()),
            Change::RemovePrimitive { primitive } => self.remove_primitive(primitive.id).map(|_| ()),
            Change::UpdatePrimitive { to, .. } => self.update_primitive(to.clone()),
            Change::InsertConstraint { constraint } => self.insert_constraint(constraint.clone()),
            Change::RemoveConstraint { constraint } => self
                .constraints
                .remove(&constraint.id)
                .map(|_| ())
                .ok_or(SketchError::UnknownConstraint(constraint.id)),
            Change::UpdateConstraint { to, .. } => self.update_constraint(to.clone()),
        }
    }

    /// Apply a whole transition, or nothing: on failure the changes already
    /// applied are reverted before the error is returned.
    pub fn apply_transition(&mut self, transition: &Transition) -> SketchResult<()> {
        for (applied, change) in transition.changes.iter().enumerate() {
            if let Err(err) = self.apply(change) {
                self.revert(&transition.changes[..applied]);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Undo already-applied changes, newest first.
    pub(crate) fn revert(&mut self, applied: &[Change]) {
        for change in applied.iter().rev() {
            if let Err(err) = self.apply(&change.inverse()) {
                // Inverses of changes that just succeeded cannot fail unless the
                // graph was modified out of band.
                warn!("Failed to revert {:?}: {}", change, err);
            }
        }
    }
}

fn wrong_kind(id: PrimitiveId, expected: &'static str, found: &PrimitiveKind) -> SketchError {
    SketchError::WrongKind {
        id,
        expected,
        found: found.name(),
    }
}
