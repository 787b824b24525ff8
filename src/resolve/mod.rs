//! Reference resolution
//!
//! Turns a realm's normalized nodes and declared relations into edge records. Every edge passes
//! through [`EdgeSet`], so the output never references a node that was not emitted for the realm.

pub mod composites;
pub mod edges;
pub mod groups;

pub use composites::{resolve_composites, RoleIndex};
pub use edges::EdgeSet;
pub use groups::resolve_groups;

use crate::error::Issue;
use crate::graph::{EdgeRecord, EdgeType, NodeKey, NodeLabel, NodeRecord, NodeRef};
use crate::normalize::{RealmRelations, ScopeAttachment};

/// Labels anchored to their realm with `CONTAINS`.
const REALM_CONTAINED: &[NodeLabel] = &[
    NodeLabel::Client,
    NodeLabel::Role,
    NodeLabel::Group,
    NodeLabel::User,
    NodeLabel::ClientScope,
    NodeLabel::AuthenticationFlow,
    NodeLabel::IdentityProvider,
    NodeLabel::Component,
];

#[derive(Debug, Default)]
pub struct ResolvedRealm {
    pub edges: Vec<EdgeRecord>,
    pub issues: Vec<Issue>,
}

/// Resolve all relations of one realm.
pub fn resolve_realm(realm: &str, nodes: &[NodeRecord], relations: &RealmRelations) -> ResolvedRealm {
    let mut edges = EdgeSet::new(nodes);
    let mut issues = Vec::new();

    let realm_ref = NodeRef::new(NodeLabel::Realm, NodeKey::realm(realm));
    for node in nodes.iter().filter(|n| REALM_CONTAINED.contains(&n.label)) {
        edges.insert(EdgeRecord::new(
            EdgeType::Contains,
            realm_ref.clone(),
            node.node_ref(),
        ));
    }

    // Client roles also hang off their client.
    for role in nodes.iter().filter(|n| {
        n.label == NodeLabel::Role && n.properties.get_bool("client_role").unwrap_or(false)
    }) {
        if let Some(client) = role.properties.get_str("container_id") {
            edges.insert(EdgeRecord::new(
                EdgeType::Contains,
                NodeRef::entity(NodeLabel::Client, realm, client),
                role.node_ref(),
            ));
        }
    }

    // Sub-components (e.g. LDAP mappers) hang off their parent component. A parent id that is
    // not a component is the realm itself and already covered by CONTAINS.
    for component in nodes.iter().filter(|n| n.label == NodeLabel::Component) {
        let Some(parent) = component.properties.get_str("parent_id") else {
            continue;
        };
        let parent = NodeRef::entity(NodeLabel::Component, realm, parent);
        if edges.contains_node(&parent) {
            edges.insert(EdgeRecord::new(EdgeType::ChildOf, component.node_ref(), parent));
        }
    }

    let index = RoleIndex::from_nodes(nodes);
    resolve_composites(realm, &index, &relations.composites, &mut edges, &mut issues);
    resolve_groups(nodes, &mut edges, &mut issues);

    for m in &relations.memberships {
        edges.insert(EdgeRecord::new(
            EdgeType::MemberOf,
            NodeRef::entity(NodeLabel::User, realm, &m.user),
            NodeRef::entity(NodeLabel::Group, realm, &m.group),
        ));
    }

    let scope_edge = |kind: EdgeType, a: &ScopeAttachment| {
        EdgeRecord::new(
            kind,
            NodeRef::entity(NodeLabel::Client, realm, &a.client),
            NodeRef::entity(NodeLabel::ClientScope, realm, &a.scope),
        )
    };
    for a in &relations.default_scopes {
        edges.insert(scope_edge(EdgeType::HasDefaultScope, a));
    }
    for a in &relations.optional_scopes {
        edges.insert(scope_edge(EdgeType::HasOptionalScope, a));
    }

    for m in &relations.mappers {
        edges.insert(EdgeRecord::new(
            EdgeType::HasMapper,
            m.owner.clone(),
            m.mapper.clone(),
        ));
    }

    for x in &relations.executions {
        edges.insert(
            EdgeRecord::new(
                EdgeType::Executes,
                NodeRef::entity(NodeLabel::AuthenticationFlow, realm, &x.flow),
                NodeRef::entity(NodeLabel::AuthenticationExecution, realm, &x.execution),
            )
            .with_property("index", x.index)
            .with_property("sequence", x.sequence)
            .with_property("level", x.level),
        );
    }

    for a in &relations.role_assignments {
        edges.insert(
            EdgeRecord::new(
                EdgeType::AssignedRole,
                a.holder.clone(),
                NodeRef::entity(NodeLabel::Role, realm, &a.role),
            )
            .with_property("scope", a.scope.as_str()),
        );
    }

    let (edges, dangling) = edges.into_parts();
    issues.extend(dangling);

    tracing::debug!(
        realm = %realm,
        edges = edges.len(),
        issues = issues.len(),
        "Resolved realm references"
    );

    ResolvedRealm { edges, issues }
}
