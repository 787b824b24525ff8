//! Write-side models for the graph store

use crate::graph::{EdgeRecord, NodeRecord};
use serde::Serialize;

/// One unit of atomic work: a slice of a realm's nodes or edges.
///
/// A store applies a batch inside a single transaction, so it lands completely or not at all.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub realm: String,
    /// Position of the batch within the realm's load, for reporting
    pub index: usize,
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

impl WriteBatch {
    pub fn len(&self) -> usize {
        self.nodes.len() + self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// Outcome of the clean pre-pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanStats {
    pub nodes_deleted: u64,
}
