//! Entity normalization
//!
//! Converts raw admin-API records into canonical [`NodeRecord`]s. [`normalize`] is pure and
//! total over well-formed input: absent optional fields take a typed default, and only a missing
//! unique-key field is an error. [`normalize_realm`] applies it to a whole [`RealmSnapshot`] and
//! extracts the declared relations that the resolver turns into edges.

pub mod properties;
pub mod relations;

pub use properties::{flatten_into, flatten_properties, scalar};
pub use relations::{
    CompositeRef, ExecutionLink, Membership, MapperAttachment, RealmRelations, RoleAssignment,
    RoleScope, ScopeAttachment,
};

use crate::error::{ExportError, Issue};
use crate::graph::{NodeKey, NodeLabel, NodeRecord, PropertyBag};
use crate::source::RealmSnapshot;
use serde_json::Value;
use std::collections::HashSet;

// ============================================================================
// Field tables
// ============================================================================

/// Default used when an optional field is absent.
#[derive(Debug, Clone, Copy)]
enum Fallback {
    Str,
    Bool,
    Int,
    List,
}

impl Fallback {
    fn value(self) -> Value {
        match self {
            Fallback::Str => Value::String(String::new()),
            Fallback::Bool => Value::Bool(false),
            Fallback::Int => Value::from(0),
            Fallback::List => Value::String("[]".to_string()),
        }
    }
}

/// (source field, property name, default)
type Field = (&'static str, &'static str, Fallback);

const REALM_FIELDS: &[Field] = &[
    ("realm", "name", Fallback::Str),
    ("displayName", "display_name", Fallback::Str),
    ("enabled", "enabled", Fallback::Bool),
    ("bruteForceProtected", "brute_force_protected", Fallback::Bool),
    ("sslRequired", "ssl_required", Fallback::Str),
    ("ssoSessionIdleTimeout", "sso_session_idle_timeout", Fallback::Int),
    ("ssoSessionMaxLifespan", "sso_session_max_lifespan", Fallback::Int),
    ("accessTokenLifespan", "access_token_lifespan", Fallback::Int),
    ("offlineSessionIdleTimeout", "offline_session_idle_timeout", Fallback::Int),
    ("passwordPolicy", "password_policy", Fallback::Str),
];

const CLIENT_FIELDS: &[Field] = &[
    ("clientId", "client_id", Fallback::Str),
    ("name", "name", Fallback::Str),
    ("protocol", "protocol", Fallback::Str),
    ("enabled", "enabled", Fallback::Bool),
    ("publicClient", "public_client", Fallback::Bool),
    ("bearerOnly", "bearer_only", Fallback::Bool),
    ("serviceAccountsEnabled", "service_accounts_enabled", Fallback::Bool),
    ("directAccessGrantsEnabled", "direct_access_grants_enabled", Fallback::Bool),
    ("standardFlowEnabled", "standard_flow_enabled", Fallback::Bool),
    ("implicitFlowEnabled", "implicit_flow_enabled", Fallback::Bool),
    ("redirectUris", "redirect_uris", Fallback::List),
    ("webOrigins", "web_origins", Fallback::List),
    ("rootUrl", "root_url", Fallback::Str),
    ("fullScopeAllowed", "full_scope_allowed", Fallback::Bool),
];

const ROLE_FIELDS: &[Field] = &[
    ("name", "name", Fallback::Str),
    ("description", "description", Fallback::Str),
    ("composite", "composite", Fallback::Bool),
    ("clientRole", "client_role", Fallback::Bool),
    ("containerId", "container_id", Fallback::Str),
];

const GROUP_FIELDS: &[Field] = &[
    ("name", "name", Fallback::Str),
    ("path", "path", Fallback::Str),
];

const USER_FIELDS: &[Field] = &[
    ("username", "username", Fallback::Str),
    ("email", "email", Fallback::Str),
    ("firstName", "first_name", Fallback::Str),
    ("lastName", "last_name", Fallback::Str),
    ("enabled", "enabled", Fallback::Bool),
    ("emailVerified", "email_verified", Fallback::Bool),
    ("federationLink", "federation_link", Fallback::Str),
    ("serviceAccountClientId", "service_account_client_id", Fallback::Str),
    ("requiredActions", "required_actions", Fallback::List),
    ("createdTimestamp", "created_timestamp", Fallback::Int),
];

const CLIENT_SCOPE_FIELDS: &[Field] = &[
    ("name", "name", Fallback::Str),
    ("protocol", "protocol", Fallback::Str),
    ("description", "description", Fallback::Str),
];

const MAPPER_FIELDS: &[Field] = &[
    ("name", "name", Fallback::Str),
    ("protocol", "protocol", Fallback::Str),
    ("protocolMapper", "mapper_type", Fallback::Str),
];

const FLOW_FIELDS: &[Field] = &[
    ("alias", "alias", Fallback::Str),
    ("description", "description", Fallback::Str),
    ("providerId", "provider_id", Fallback::Str),
    ("builtIn", "built_in", Fallback::Bool),
    ("topLevel", "top_level", Fallback::Bool),
];

const EXECUTION_FIELDS: &[Field] = &[
    ("displayName", "display_name", Fallback::Str),
    ("providerId", "provider_id", Fallback::Str),
    ("requirement", "requirement", Fallback::Str),
    ("level", "level", Fallback::Int),
    ("index", "index", Fallback::Int),
    ("authenticationFlow", "authentication_flow", Fallback::Bool),
    ("flowId", "flow_id", Fallback::Str),
];

const IDP_FIELDS: &[Field] = &[
    ("alias", "alias", Fallback::Str),
    ("displayName", "display_name", Fallback::Str),
    ("providerId", "provider_id", Fallback::Str),
    ("enabled", "enabled", Fallback::Bool),
    ("trustEmail", "trust_email", Fallback::Bool),
    ("storeToken", "store_token", Fallback::Bool),
    ("linkOnly", "link_only", Fallback::Bool),
    ("hideOnLogin", "hide_on_login", Fallback::Bool),
    ("firstBrokerLoginFlowAlias", "first_broker_login_flow_alias", Fallback::Str),
    ("postBrokerLoginFlowAlias", "post_broker_login_flow_alias", Fallback::Str),
];

const IDP_MAPPER_FIELDS: &[Field] = &[
    ("name", "name", Fallback::Str),
    ("identityProviderAlias", "identity_provider_alias", Fallback::Str),
    ("identityProviderMapper", "mapper_type", Fallback::Str),
];

const COMPONENT_FIELDS: &[Field] = &[
    ("name", "name", Fallback::Str),
    ("providerId", "provider_id", Fallback::Str),
    ("providerType", "provider_type", Fallback::Str),
    ("parentId", "parent_id", Fallback::Str),
    ("subType", "sub_type", Fallback::Str),
];

/// Config entries holding credentials; never copied into the graph.
const SECRET_CONFIG_KEYS: &[&str] = &["clientSecret", "bindCredential"];

fn fields_for(label: NodeLabel) -> &'static [Field] {
    match label {
        NodeLabel::Realm => REALM_FIELDS,
        NodeLabel::Client => CLIENT_FIELDS,
        NodeLabel::Role => ROLE_FIELDS,
        NodeLabel::Group => GROUP_FIELDS,
        NodeLabel::User => USER_FIELDS,
        NodeLabel::ClientScope => CLIENT_SCOPE_FIELDS,
        NodeLabel::ProtocolMapper => MAPPER_FIELDS,
        NodeLabel::AuthenticationFlow => FLOW_FIELDS,
        NodeLabel::AuthenticationExecution => EXECUTION_FIELDS,
        NodeLabel::IdentityProvider => IDP_FIELDS,
        NodeLabel::IdpMapper => IDP_MAPPER_FIELDS,
        NodeLabel::Component => COMPONENT_FIELDS,
    }
}

/// Field holding the unique key of a raw record.
pub fn key_field(label: NodeLabel) -> &'static str {
    match label {
        NodeLabel::Realm => "realm",
        NodeLabel::IdentityProvider => "internalId",
        _ => "id",
    }
}

// ============================================================================
// Record normalization
// ============================================================================

/// Normalize one raw record into a node of `label` in `realm`.
pub fn normalize(realm: &str, label: NodeLabel, raw: &Value) -> Result<NodeRecord, ExportError> {
    let key_field = key_field(label);
    let id = raw
        .get(key_field)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ExportError::MalformedRecord {
            label: label.to_string(),
            field: key_field.to_string(),
        })?;

    let mut properties = PropertyBag::new();
    properties.insert("realm", realm);

    for (source, target, default) in fields_for(label) {
        match raw.get(*source) {
            Some(value) if !value.is_null() => properties.insert(*target, scalar(value)),
            _ => properties.insert(*target, default.value()),
        }
    }

    let key = match label {
        NodeLabel::Realm => NodeKey::realm(id),
        _ => {
            properties.insert("id", id);
            NodeKey::entity(realm, id)
        }
    };

    match label {
        NodeLabel::Role => {
            let client_role = properties.get_bool("client_role").unwrap_or(false);
            properties.insert("scope", RoleScope::of(client_role).as_str());
            flatten_attributes(&mut properties, raw);
        }
        NodeLabel::Group => {
            let depth = split_group_path(properties.get_str("path").unwrap_or_default()).len();
            properties.insert("depth", depth as i64);
            flatten_attributes(&mut properties, raw);
        }
        NodeLabel::User => flatten_attributes(&mut properties, raw),
        NodeLabel::ClientScope => {
            let include = raw
                .pointer("/attributes/include.in.token.scope")
                .and_then(Value::as_str)
                .map(|v| v == "true")
                .unwrap_or(false);
            properties.insert("include_in_token_scope", include);
            properties.insert("classification", ScopeClassification::None.as_str());
            flatten_attributes(&mut properties, raw);
        }
        NodeLabel::ProtocolMapper | NodeLabel::IdpMapper => {
            if let Some(config) = raw.get("config") {
                flatten_into(&mut properties, "config", config);
            }
        }
        NodeLabel::IdentityProvider => flatten_config(&mut properties, raw),
        NodeLabel::Component => {
            if properties.get_str("name").map_or(true, str::is_empty) {
                let short: String = id.chars().take(8).collect();
                properties.insert("name", format!("Unnamed Component ({})", short));
            }
            flatten_config(&mut properties, raw);
        }
        _ => {}
    }

    Ok(NodeRecord {
        label,
        key,
        properties,
    })
}

/// Flatten `config` under `config.*`, leaving out credential entries.
fn flatten_config(properties: &mut PropertyBag, raw: &Value) {
    let Some(config) = raw.get("config") else {
        return;
    };
    for (key, value) in flatten_properties(config, SECRET_CONFIG_KEYS).iter() {
        properties.insert(format!("config.{}", key), value.clone());
    }
}

fn flatten_attributes(properties: &mut PropertyBag, raw: &Value) {
    if let Some(attributes) = raw.get("attributes") {
        flatten_into(properties, "attributes", attributes);
    }
}

/// Split a group path into its segments.
///
/// Paths are `/`-delimited; a segment containing `/` is escaped as `~/` at the source.
pub fn split_group_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '~' if chars.peek() == Some(&'/') => {
                chars.next();
                current.push('/');
            }
            '/' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            other => current.push(other),
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Default / optional classification of a client scope at realm level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeClassification {
    Default,
    Optional,
    None,
}

impl ScopeClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Optional => "optional",
            Self::None => "none",
        }
    }
}

// ============================================================================
// Realm normalization
// ============================================================================

/// Nodes, declared relations and record-level issues of one realm.
#[derive(Debug, Default)]
pub struct NormalizedRealm {
    pub nodes: Vec<NodeRecord>,
    pub relations: RealmRelations,
    pub issues: Vec<Issue>,
}

/// Normalize every record of a realm snapshot.
///
/// Malformed records are dropped and reported; a malformed realm record is an error because
/// nothing else in the realm can be anchored without it.
pub fn normalize_realm(snapshot: &RealmSnapshot) -> Result<NormalizedRealm, ExportError> {
    let realm_node = normalize(snapshot.realm_name(), NodeLabel::Realm, &snapshot.realm)?;
    let realm = realm_node.key.as_str().to_string();

    let mut out = NormalizedRealm::default();
    out.nodes.push(realm_node);

    let push = |label: NodeLabel, raw: &Value, out: &mut NormalizedRealm| {
        match normalize(&realm, label, raw) {
            Ok(node) => {
                out.nodes.push(node);
                true
            }
            Err(e) => {
                tracing::warn!(realm = %realm, error = %e, "Dropping malformed record");
                out.issues.push(Issue::from(&e));
                false
            }
        }
    };

    for client in &snapshot.clients {
        if push(NodeLabel::Client, client, &mut out) {
            for mapper in embedded_mappers(client) {
                push(NodeLabel::ProtocolMapper, mapper, &mut out);
            }
        }
    }
    for role in snapshot.realm_roles.iter().chain(&snapshot.client_roles) {
        push(NodeLabel::Role, role, &mut out);
    }
    for group in &snapshot.groups {
        push(NodeLabel::Group, group, &mut out);
    }
    for user in &snapshot.users {
        push(NodeLabel::User, user, &mut out);
    }

    let default_ids = ids_of(&snapshot.realm_default_scopes);
    let optional_ids = ids_of(&snapshot.realm_optional_scopes);
    for scope in &snapshot.client_scopes {
        if !push(NodeLabel::ClientScope, scope, &mut out) {
            continue;
        }
        if let Some(node) = out.nodes.last_mut() {
            let id = node.properties.get_str("id").unwrap_or_default().to_string();
            let classification = if default_ids.contains(&id) {
                ScopeClassification::Default
            } else if optional_ids.contains(&id) {
                ScopeClassification::Optional
            } else {
                ScopeClassification::None
            };
            node.properties.insert("classification", classification.as_str());
        }
        for mapper in embedded_mappers(scope) {
            push(NodeLabel::ProtocolMapper, mapper, &mut out);
        }
    }

    for flow in &snapshot.flows {
        push(NodeLabel::AuthenticationFlow, flow, &mut out);
    }
    for (_, executions) in &snapshot.flow_executions {
        for execution in executions {
            push(NodeLabel::AuthenticationExecution, execution, &mut out);
        }
    }

    for idp in &snapshot.identity_providers {
        push(NodeLabel::IdentityProvider, idp, &mut out);
    }
    for (_, mappers) in &snapshot.idp_mappers {
        for mapper in mappers {
            push(NodeLabel::IdpMapper, mapper, &mut out);
        }
    }
    for component in &snapshot.components {
        push(NodeLabel::Component, component, &mut out);
    }

    out.relations = relations::extract_relations(snapshot, &mut out.issues);

    tracing::debug!(
        realm = %realm,
        nodes = out.nodes.len(),
        issues = out.issues.len(),
        "Normalized realm"
    );

    Ok(out)
}

pub(crate) fn embedded_mappers(owner: &Value) -> &[Value] {
    owner
        .get("protocolMappers")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn ids_of(records: &[Value]) -> HashSet<String> {
    records
        .iter()
        .filter_map(|r| r.get("id").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}
