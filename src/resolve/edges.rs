//! Edge accumulator with referential-integrity guard.

use crate::error::{Issue, IssueKind};
use crate::graph::{EdgeIdentity, EdgeRecord, NodeRecord, NodeRef};
use std::collections::HashSet;

/// Collects edges for one realm.
///
/// An edge is accepted only if both endpoints are among the nodes emitted for the realm;
/// otherwise a `DanglingReference` issue is recorded and no phantom node is implied. Edges are
/// deduplicated by (type, source, target); the first occurrence wins.
#[derive(Debug, Default)]
pub struct EdgeSet {
    known: HashSet<NodeRef>,
    seen: HashSet<EdgeIdentity>,
    edges: Vec<EdgeRecord>,
    issues: Vec<Issue>,
}

impl EdgeSet {
    pub fn new(nodes: &[NodeRecord]) -> Self {
        Self {
            known: nodes.iter().map(NodeRecord::node_ref).collect(),
            ..Default::default()
        }
    }

    pub fn contains_node(&self, node: &NodeRef) -> bool {
        self.known.contains(node)
    }

    /// Add an edge. Returns `false` if it was dangling or already present.
    pub fn insert(&mut self, edge: EdgeRecord) -> bool {
        for end in [&edge.source, &edge.target] {
            if !self.contains_node(end) {
                self.issues.push(Issue::new(
                    IssueKind::DanglingReference,
                    format!(
                        "{} {} -> {} references unknown {}",
                        edge.kind, edge.source, edge.target, end
                    ),
                ));
                return false;
            }
        }
        if !self.seen.insert(edge.identity()) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn into_parts(self) -> (Vec<EdgeRecord>, Vec<Issue>) {
        (self.edges, self.issues)
    }
}
