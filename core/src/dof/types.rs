//! DOF arena: independent values, dependent expressions, cached evaluation.

use super::functions::SolverFunction;
use crate::error::{SketchError, SketchResult};
use crate::ids::{DofId, EntityRef};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DofKind {
    /// Free-standing scalar. `free` controls whether the solver may move it.
    Independent { value: f64, free: bool },
    /// Value computed from other DOFs.
    Dependent {
        function: SolverFunction,
        inputs: Vec<DofId>,
    },
}

impl DofKind {
    pub fn independent(value: f64, free: bool) -> Self {
        DofKind::Independent { value, free }
    }

    pub fn dependent(function: SolverFunction, inputs: Vec<DofId>) -> Self {
        DofKind::Dependent { function, inputs }
    }

    pub fn inputs(&self) -> &[DofId] {
        match self {
            DofKind::Independent { .. } => &[],
            DofKind::Dependent { inputs, .. } => inputs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dof {
    pub id: DofId,
    pub kind: DofKind,
    /// Entity that created this DOF, if any.
    #[serde(default)]
    pub owner: Option<EntityRef>,
}

impl Dof {
    pub fn is_independent(&self) -> bool {
        matches!(self.kind, DofKind::Independent { .. })
    }

    pub fn is_free(&self) -> bool {
        matches!(self.kind, DofKind::Independent { free: true, .. })
    }
}

/// Owns every DOF of a model.
///
/// Dependent values are cached on first read. Writes to an independent DOF
/// walk the reverse-dependency index and drop every cached value downstream.
#[derive(Debug, Clone, Default)]
pub struct DofStore {
    dofs: BTreeMap<DofId, Dof>,
    /// input -> dependent DOFs that read it
    dependents: HashMap<DofId, BTreeSet<DofId>>,
    cache: RefCell<HashMap<DofId, f64>>,
}

impl PartialEq for DofStore {
    fn eq(&self, other: &Self) -> bool {
        // Index and cache are derived from `dofs`.
        self.dofs == other.dofs
    }
}

impl DofStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.dofs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dofs.is_empty()
    }

    pub fn contains(&self, id: DofId) -> bool {
        self.dofs.contains_key(&id)
    }

    pub fn get(&self, id: DofId) -> SketchResult<&Dof> {
        self.dofs.get(&id).ok_or(SketchError::UnknownDof(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dof> {
        self.dofs.values()
    }

    /// DOFs whose definition reads `id` directly.
    pub fn direct_dependents(&self, id: DofId) -> impl Iterator<Item = DofId> + '_ {
        self.dependents.get(&id).into_iter().flatten().copied()
    }

    /// Insert a new DOF. Fails without modifying the store if an input is
    /// missing, the arity is wrong, or the definition would be cyclic.
    pub fn insert(&mut self, dof: Dof) -> SketchResult<()> {
        if self.dofs.contains_key(&dof.id) {
            return Err(SketchError::InvalidValue(format!("{} already exists", dof.id)));
        }
        self.validate_definition(dof.id, &dof.kind)?;
        self.index(dof.id, &dof.kind);
        self.dofs.insert(dof.id, dof);
        Ok(())
    }

    /// Remove a DOF. Fails if another DOF still reads it.
    pub fn remove(&mut self, id: DofId) -> SketchResult<Dof> {
        if let Some(reader) = self.direct_dependents(id).next() {
            return Err(SketchError::ReferentialIntegrity {
                entity: id.to_string(),
                referenced_by: reader.to_string(),
            });
        }
        let dof = self.dofs.remove(&id).ok_or(SketchError::UnknownDof(id))?;
        self.unindex(id, &dof.kind);
        self.dependents.remove(&id);
        self.cache.borrow_mut().remove(&id);
        Ok(dof)
    }

    /// Replace the definition of an existing DOF, returning the old one.
    pub fn redefine(&mut self, id: DofId, kind: DofKind) -> SketchResult<DofKind> {
        if !self.dofs.contains_key(&id) {
            return Err(SketchError::UnknownDof(id));
        }
        self.validate_definition(id, &kind)?;
        let old = match self.dofs.get_mut(&id) {
            Some(dof) => std::mem::replace(&mut dof.kind, kind.clone()),
            None => return Err(SketchError::UnknownDof(id)),
        };
        self.unindex(id, &old);
        self.index(id, &kind);
        self.invalidate(id);
        Ok(old)
    }

    fn validate_definition(&self, id: DofId, kind: &DofKind) -> SketchResult<()> {
        match kind {
            DofKind::Independent { value, .. } => {
                if !value.is_finite() {
                    return Err(SketchError::InvalidValue(format!("{} = {}", id, value)));
                }
                Ok(())
            }
            DofKind::Dependent { function, inputs } => {
                if inputs.len() != function.arity() {
                    return Err(SketchError::Arity {
                        function: function.name(),
                        expected: function.arity(),
                        found: inputs.len(),
                    });
                }
                for input in inputs {
                    if *input != id && !self.dofs.contains_key(input) {
                        return Err(SketchError::UnknownDof(*input));
                    }
                }
                self.check_cycle(id, inputs)
            }
        }
    }

    /// Fails if defining `id` from `inputs` would make `id` depend on itself.
    pub fn check_cycle(&self, id: DofId, inputs: &[DofId]) -> SketchResult<()> {
        let mut visited = HashSet::new();
        let mut path = vec![id];
        for input in inputs {
            if self.reaches(*input, id, &mut visited, &mut path) {
                return Err(SketchError::CyclicDependency { dof: id, path });
            }
        }
        Ok(())
    }

    fn reaches(
        &self,
        from: DofId,
        target: DofId,
        visited: &mut HashSet<DofId>,
        path: &mut Vec<DofId>,
    ) -> bool {
        path.push(from);
        if from == target {
            return true;
        }
        if visited.insert(from) {
            if let Some(dof) = self.dofs.get(&from) {
                for next in dof.kind.inputs() {
                    if self.reaches(*next, target, visited, path) {
                        return true;
                    }
                }
            }
        }
        path.pop();
        false
    }

    fn index(&mut self, id: DofId, kind: &DofKind) {
        for input in kind.inputs() {
            self.dependents.entry(*input).or_default().insert(id);
        }
    }

    fn unindex(&mut self, id: DofId, kind: &DofKind) {
        for input in kind.inputs() {
            if let Some(set) = self.dependents.get_mut(input) {
                set.remove(&id);
                if set.is_empty() {
                    self.dependents.remove(input);
                }
            }
        }
    }

    /// Drop cached values of `id` and everything downstream of it.
    fn invalidate(&self, id: DofId) {
        let mut cache = self.cache.borrow_mut();
        if cache.is_empty() {
            return;
        }
        let mut stack = vec![id];
        let mut seen = HashSet::new();
        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            cache.remove(&next);
            stack.extend(self.direct_dependents(next));
        }
    }

    /// Current value, evaluating (and caching) dependent DOFs on demand.
    pub fn value(&self, id: DofId) -> SketchResult<f64> {
        let dof = self.get(id)?;
        match &dof.kind {
            DofKind::Independent { value, .. } => Ok(*value),
            DofKind::Dependent { function, inputs } => {
                if let Some(cached) = self.cache.borrow().get(&id) {
                    return Ok(*cached);
                }
                let args = inputs
                    .iter()
                    .map(|input| self.value(*input))
                    .collect::<SketchResult<Vec<_>>>()?;
                let value = function.evaluate(&args);
                self.cache.borrow_mut().insert(id, value);
                Ok(value)
            }
        }
    }

    /// Values for a list of DOFs, in order.
    pub fn values(&self, ids: &[DofId]) -> SketchResult<Vec<f64>> {
        ids.iter().map(|id| self.value(*id)).collect()
    }

    /// Store a new value on an independent DOF. Returns the previous value.
    /// Any finite value is accepted; NaN and infinities are `InvalidValue`.
    pub fn set_value(&mut self, id: DofId, new_value: f64) -> SketchResult<f64> {
        if !new_value.is_finite() {
            return Err(SketchError::InvalidValue(format!("{} = {}", id, new_value)));
        }
        let dof = self.dofs.get_mut(&id).ok_or(SketchError::UnknownDof(id))?;
        let previous = match &mut dof.kind {
            DofKind::Independent { value, .. } => std::mem::replace(value, new_value),
            DofKind::Dependent { .. } => return Err(SketchError::NotIndependent(id)),
        };
        if previous.to_bits() != new_value.to_bits() {
            self.invalidate(id);
        }
        Ok(previous)
    }

    /// Mark an independent DOF free or fixed. Returns the previous flag.
    pub fn set_free(&mut self, id: DofId, new_free: bool) -> SketchResult<bool> {
        let dof = self.dofs.get_mut(&id).ok_or(SketchError::UnknownDof(id))?;
        match &mut dof.kind {
            DofKind::Independent { free, .. } => Ok(std::mem::replace(free, new_free)),
            DofKind::Dependent { .. } => Err(SketchError::NotIndependent(id)),
        }
    }

    /// Independent DOFs that `id` ultimately reads (itself, if independent).
    pub fn independent_roots(&self, id: DofId) -> SketchResult<BTreeSet<DofId>> {
        let mut roots = BTreeSet::new();
        let mut stack = vec![id];
        let mut seen = HashSet::new();
        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            match &self.get(next)?.kind {
                DofKind::Independent { .. } => {
                    roots.insert(next);
                }
                DofKind::Dependent { inputs, .. } => stack.extend(inputs.iter().copied()),
            }
        }
        Ok(roots)
    }

    /// Partial derivatives of `id` with respect to the independent DOFs it
    /// reads, composed through dependents with the chain rule.
    pub fn gradient(&self, id: DofId) -> SketchResult<BTreeMap<DofId, f64>> {
        let mut memo = HashMap::new();
        self.gradient_memo(id, &mut memo)
    }

    pub(crate) fn gradient_memo(
        &self,
        id: DofId,
        memo: &mut HashMap<DofId, BTreeMap<DofId, f64>>,
    ) -> SketchResult<BTreeMap<DofId, f64>> {
        if let Some(known) = memo.get(&id) {
            return Ok(known.clone());
        }
        let result = match &self.get(id)?.kind {
            DofKind::Independent { .. } => BTreeMap::from([(id, 1.0)]),
            DofKind::Dependent { function, inputs } => {
                let args = self.values(inputs)?;
                let local = function.gradient(&args);
                let mut total = BTreeMap::new();
                for (input, d_input) in inputs.iter().zip(local) {
                    if d_input == 0.0 {
                        continue;
                    }
                    for (root, d_root) in self.gradient_memo(*input, memo)? {
                        *total.entry(root).or_insert(0.0) += d_input * d_root;
                    }
                }
                total
            }
        };
        memo.insert(id, result.clone());
        Ok(result)
    }
}
