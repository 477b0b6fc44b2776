//! Typed identifiers for DOFs, primitives and constraints, and the allocator
//! that hands them out.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! sketch_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

sketch_id!(DofId, "dof#");
sketch_id!(PrimitiveId, "prim#");
sketch_id!(ConstraintId, "con#");

/// Either kind of graph entity, used where a DOF records its creator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityRef {
    Primitive(PrimitiveId),
    Constraint(ConstraintId),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Primitive(id) => id.fmt(f),
            EntityRef::Constraint(id) => id.fmt(f),
        }
    }
}

/// Monotonic id source owned by a model.
///
/// All three id types draw from one counter so that ids are unique across the
/// whole model, which keeps log output unambiguous. Ids are never reused, even
/// after undo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    fn bump(&mut self) -> u64 {
        let id = self.next.max(1);
        self.next = id + 1;
        id
    }

    pub fn dof(&mut self) -> DofId {
        DofId(self.bump())
    }

    pub fn primitive(&mut self) -> PrimitiveId {
        PrimitiveId(self.bump())
    }

    pub fn constraint(&mut self) -> ConstraintId {
        ConstraintId(self.bump())
    }

    /// Make sure every future id is strictly greater than `seen`.
    /// Used when rebuilding a model from a persisted log.
    pub fn advance_past(&mut self, seen: u64) {
        if self.next <= seen {
            self.next = seen + 1;
        }
    }

    pub fn peek(&self) -> u64 {
        self.next.max(1)
    }
}
