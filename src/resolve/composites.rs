//! Composite role resolution.
//!
//! Composite links are a plain directed edge list: each declared child is looked up by name
//! (realm roles) or by (owning client id, name) (client roles) and emitted as `COMPOSITE_OF`.
//! Nothing is traversed, so cycles are recorded exactly as declared.

use crate::error::{Issue, IssueKind};
use crate::graph::{EdgeRecord, EdgeType, NodeLabel, NodeRecord, NodeRef};
use crate::normalize::CompositeRef;
use crate::resolve::edges::EdgeSet;
use std::collections::HashMap;

/// Role lookup by declared name.
#[derive(Debug, Default)]
pub struct RoleIndex {
    realm_roles: HashMap<String, NodeRef>,
    client_roles: HashMap<(String, String), NodeRef>,
}

impl RoleIndex {
    pub fn from_nodes(nodes: &[NodeRecord]) -> Self {
        let mut index = Self::default();
        for node in nodes.iter().filter(|n| n.label == NodeLabel::Role) {
            let Some(name) = node.properties.get_str("name") else {
                continue;
            };
            if node.properties.get_bool("client_role").unwrap_or(false) {
                let client = node
                    .properties
                    .get_str("container_id")
                    .unwrap_or_default()
                    .to_string();
                index
                    .client_roles
                    .insert((client, name.to_string()), node.node_ref());
            } else {
                index.realm_roles.insert(name.to_string(), node.node_ref());
            }
        }
        index
    }

    /// Resolve a reference. A client-qualified reference only matches a role of that client.
    pub fn lookup(&self, reference: &CompositeRef) -> Option<&NodeRef> {
        match &reference.client {
            Some(client) => self
                .client_roles
                .get(&(client.clone(), reference.name.clone())),
            None => self.realm_roles.get(&reference.name),
        }
    }
}

fn describe(reference: &CompositeRef) -> String {
    match &reference.client {
        Some(client) => format!("client role '{}' of client {}", reference.name, client),
        None => format!("realm role '{}'", reference.name),
    }
}

/// Emit `COMPOSITE_OF` edges for every resolvable reference.
pub fn resolve_composites(
    realm: &str,
    index: &RoleIndex,
    composites: &[(String, Vec<CompositeRef>)],
    edges: &mut EdgeSet,
    issues: &mut Vec<Issue>,
) {
    for (parent_id, children) in composites {
        let parent = NodeRef::entity(NodeLabel::Role, realm, parent_id);
        for child in children {
            match index.lookup(child) {
                Some(target) => {
                    edges.insert(EdgeRecord::new(
                        EdgeType::CompositeOf,
                        parent.clone(),
                        target.clone(),
                    ));
                }
                None => {
                    tracing::warn!(
                        realm = %realm,
                        role = %parent_id,
                        reference = %child.name,
                        "Unresolved composite role reference"
                    );
                    issues.push(Issue::new(
                        IssueKind::UnresolvedComposite,
                        format!("role {} references unknown {}", parent, describe(child)),
                    ));
                }
            }
        }
    }
}
