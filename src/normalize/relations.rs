//! Declared relations extracted from a realm snapshot.
//!
//! These are the references exactly as the source states them (by id, or by name for composite
//! roles). Turning them into edges, and checking that both ends exist, is the resolver's job.

use crate::error::{Issue, IssueKind};
use crate::graph::{NodeLabel, NodeRef};
use crate::normalize::embedded_mappers;
use crate::source::RealmSnapshot;
use serde_json::Value;

/// A composite-role child as declared: role name plus, for client roles, the owning client's
/// internal id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeRef {
    pub name: String,
    pub client: Option<String>,
}

impl CompositeRef {
    pub fn realm(name: &str) -> Self {
        Self {
            name: name.to_string(),
            client: None,
        }
    }

    pub fn client(client: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            client: Some(client.to_string()),
        }
    }
}

/// Whether a role belongs to the realm or to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleScope {
    Realm,
    Client,
}

impl RoleScope {
    pub fn of(client_role: bool) -> Self {
        if client_role {
            Self::Client
        } else {
            Self::Realm
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Realm => "realm",
            Self::Client => "client",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub user: String,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeAttachment {
    pub client: String,
    pub scope: String,
}

/// A protocol mapper under its client or scope, or an identity-provider mapper under its IdP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapperAttachment {
    pub owner: NodeRef,
    pub mapper: NodeRef,
}

/// A flow step in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionLink {
    pub flow: String,
    pub execution: String,
    /// Source-declared index within its level
    pub index: i64,
    /// Position in the flattened execution list
    pub sequence: i64,
    pub level: i64,
}

/// A role granted directly to a user, service-account client or group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    pub holder: NodeRef,
    pub role: String,
    pub scope: RoleScope,
}

#[derive(Debug, Clone, Default)]
pub struct RealmRelations {
    /// parent role id → declared children
    pub composites: Vec<(String, Vec<CompositeRef>)>,
    pub memberships: Vec<Membership>,
    pub default_scopes: Vec<ScopeAttachment>,
    pub optional_scopes: Vec<ScopeAttachment>,
    pub mappers: Vec<MapperAttachment>,
    pub executions: Vec<ExecutionLink>,
    pub role_assignments: Vec<RoleAssignment>,
}

fn str_field<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get(field).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Composite children of one role.
pub fn composite_refs(children: &[Value], issues: &mut Vec<Issue>) -> Vec<CompositeRef> {
    let mut refs = Vec::with_capacity(children.len());
    for child in children {
        let Some(name) = str_field(child, "name") else {
            issues.push(Issue::new(
                IssueKind::MalformedRecord,
                "composite role reference without a name",
            ));
            continue;
        };
        let client_role = child
            .get("clientRole")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        match (client_role, str_field(child, "containerId")) {
            (true, Some(container)) => refs.push(CompositeRef::client(container, name)),
            (true, None) => issues.push(Issue::new(
                IssueKind::MalformedRecord,
                format!("client role reference '{}' without an owning client", name),
            )),
            (false, _) => refs.push(CompositeRef::realm(name)),
        }
    }
    refs
}

/// Role ids in a role-mappings document (`realmMappings` + `clientMappings.*.mappings`).
pub fn mapped_roles(mappings: &Value) -> Vec<(String, RoleScope)> {
    let ids = |roles: Option<&Value>| -> Vec<String> {
        roles
            .and_then(Value::as_array)
            .map(|roles| {
                roles
                    .iter()
                    .filter_map(|r| str_field(r, "id"))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };

    let mut out: Vec<(String, RoleScope)> = ids(mappings.get("realmMappings"))
        .into_iter()
        .map(|id| (id, RoleScope::Realm))
        .collect();

    if let Some(clients) = mappings.get("clientMappings").and_then(Value::as_object) {
        for client in clients.values() {
            out.extend(
                ids(client.get("mappings"))
                    .into_iter()
                    .map(|id| (id, RoleScope::Client)),
            );
        }
    }
    out
}

/// Extract every declared relation of a realm.
pub fn extract_relations(snapshot: &RealmSnapshot, issues: &mut Vec<Issue>) -> RealmRelations {
    let realm = snapshot.realm_name();
    let mut rel = RealmRelations::default();

    for (role, children) in &snapshot.composites {
        let refs = composite_refs(children, issues);
        if !refs.is_empty() {
            rel.composites.push((role.clone(), refs));
        }
    }

    for (user, groups) in &snapshot.user_groups {
        for group in groups.iter().filter_map(|g| str_field(g, "id")) {
            rel.memberships.push(Membership {
                user: user.clone(),
                group: group.to_string(),
            });
        }
    }

    let attachments = |listing: &[(String, Vec<Value>)]| -> Vec<ScopeAttachment> {
        listing
            .iter()
            .flat_map(|(client, scopes)| {
                scopes.iter().filter_map(move |s| {
                    str_field(s, "id").map(|scope| ScopeAttachment {
                        client: client.clone(),
                        scope: scope.to_string(),
                    })
                })
            })
            .collect()
    };
    rel.default_scopes = attachments(&snapshot.client_default_scopes);
    rel.optional_scopes = attachments(&snapshot.client_optional_scopes);

    let owners = snapshot
        .clients
        .iter()
        .map(|c| (NodeLabel::Client, c))
        .chain(snapshot.client_scopes.iter().map(|s| (NodeLabel::ClientScope, s)));
    for (label, owner) in owners {
        let Some(owner_id) = str_field(owner, "id") else {
            continue;
        };
        for mapper in embedded_mappers(owner)
            .iter()
            .filter_map(|m| str_field(m, "id"))
        {
            rel.mappers.push(MapperAttachment {
                owner: NodeRef::entity(label, realm, owner_id),
                mapper: NodeRef::entity(NodeLabel::ProtocolMapper, realm, mapper),
            });
        }
    }

    for (idp, mappers) in &snapshot.idp_mappers {
        for mapper in mappers.iter().filter_map(|m| str_field(m, "id")) {
            rel.mappers.push(MapperAttachment {
                owner: NodeRef::entity(NodeLabel::IdentityProvider, realm, idp),
                mapper: NodeRef::entity(NodeLabel::IdpMapper, realm, mapper),
            });
        }
    }

    for (flow, executions) in &snapshot.flow_executions {
        for (position, execution) in executions.iter().enumerate() {
            let Some(id) = str_field(execution, "id") else {
                continue;
            };
            let sequence = position as i64;
            rel.executions.push(ExecutionLink {
                flow: flow.clone(),
                execution: id.to_string(),
                index: execution
                    .get("index")
                    .and_then(Value::as_i64)
                    .unwrap_or(sequence),
                sequence,
                level: execution.get("level").and_then(Value::as_i64).unwrap_or(0),
            });
        }
    }

    let holders = [
        (NodeLabel::User, &snapshot.user_role_mappings),
        (NodeLabel::Client, &snapshot.service_account_role_mappings),
        (NodeLabel::Group, &snapshot.group_role_mappings),
    ];
    for (label, mappings) in holders {
        for (holder, doc) in mappings {
            for (role, scope) in mapped_roles(doc) {
                rel.role_assignments.push(RoleAssignment {
                    holder: NodeRef::entity(label, realm, holder),
                    role,
                    scope,
                });
            }
        }
    }

    rel
}
