//! Edge loops: ordered edges that close on themselves.
//!
//! Connectivity is by DOF identity. Two endpoints touch only if they are
//! built from the very same `s`/`t` DOFs, never because their values happen
//! to be equal.

use super::graph::Graph;
use super::primitives::EdgeEnd;
use crate::ids::PrimitiveId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Why a loop was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopDefect {
    TooFewEdges,
    DuplicateEdge(PrimitiveId),
    /// Edge is missing or is not a Line2D/Arc2D.
    NotAnEdge(PrimitiveId),
    /// Edges at positions `i` and `i + 1` (cyclically) share no endpoint.
    Gap(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeLoop {
    pub edges: Vec<PrimitiveId>,
}

impl EdgeLoop {
    pub fn new(edges: Vec<PrimitiveId>) -> Self {
        Self { edges }
    }

    pub fn is_loop_valid(&self, graph: &Graph) -> bool {
        self.check(graph).is_ok()
    }

    /// Like [`EdgeLoop::is_loop_valid`] but reports the first defect found.
    pub fn check(&self, graph: &Graph) -> Result<(), LoopDefect> {
        if self.edges.len() < 2 {
            return Err(LoopDefect::TooFewEdges);
        }

        let mut seen = HashSet::new();
        for edge in &self.edges {
            if !seen.insert(*edge) {
                return Err(LoopDefect::DuplicateEdge(*edge));
            }
            let is_edge = graph
                .primitive(*edge)
                .map(|p| p.kind.is_edge())
                .unwrap_or(false);
            if !is_edge {
                return Err(LoopDefect::NotAnEdge(*edge));
            }
        }

        for i in 0..self.edges.len() {
            let a = self.edges[i];
            let b = self.edges[(i + 1) % self.edges.len()];
            if !share_endpoint(graph, a, b) {
                return Err(LoopDefect::Gap(i));
            }
        }
        Ok(())
    }
}

fn share_endpoint(graph: &Graph, a: PrimitiveId, b: PrimitiveId) -> bool {
    EdgeEnd::BOTH.iter().any(|end_a| {
        EdgeEnd::BOTH
            .iter()
            .any(|end_b| graph.endpoints_coincide((a, *end_a), (b, *end_b)).unwrap_or(false))
    })
}
