//! Source-side models: collections, cursors, pages and the raw per-realm snapshot.

use serde_json::Value;
use std::fmt;

/// A fetchable collection of the Keycloak admin API.
///
/// Some collections are scoped to a parent entity (a client, role, group, user, flow or
/// identity provider).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Collection {
    Clients,
    RealmRoles,
    ClientRoles { client: String },
    RoleComposites { role: String },
    Groups,
    GroupChildren { group: String },
    GroupRoleMappings { group: String },
    Users,
    UserGroups { user: String },
    UserRoleMappings { user: String },
    ServiceAccountUser { client: String },
    ClientScopes,
    RealmDefaultScopes,
    RealmOptionalScopes,
    ClientDefaultScopes { client: String },
    ClientOptionalScopes { client: String },
    AuthenticationFlows,
    FlowExecutions { alias: String },
    IdentityProviders,
    IdpMappers { alias: String },
    Components,
}

/// Where a collection lives and how it is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Path relative to `/admin/realms/{realm}`
    pub path: String,
    /// Accepts `first` / `max`
    pub paginated: bool,
    /// Accepts `briefRepresentation=false`
    pub full_representation: bool,
}

impl Collection {
    pub fn endpoint(&self) -> Endpoint {
        let enc = |s: &str| urlencoding::encode(s).into_owned();
        let (path, paginated, full_representation) = match self {
            Self::Clients => ("/clients".to_string(), true, false),
            Self::RealmRoles => ("/roles".to_string(), true, true),
            Self::ClientRoles { client } => (format!("/clients/{}/roles", enc(client)), true, true),
            Self::RoleComposites { role } => {
                (format!("/roles-by-id/{}/composites", enc(role)), false, false)
            }
            Self::Groups => ("/groups".to_string(), true, true),
            Self::GroupChildren { group } => {
                (format!("/groups/{}/children", enc(group)), true, true)
            }
            Self::GroupRoleMappings { group } => {
                (format!("/groups/{}/role-mappings", enc(group)), false, false)
            }
            Self::Users => ("/users".to_string(), true, true),
            Self::UserGroups { user } => (format!("/users/{}/groups", enc(user)), true, false),
            Self::UserRoleMappings { user } => {
                (format!("/users/{}/role-mappings", enc(user)), false, false)
            }
            Self::ServiceAccountUser { client } => (
                format!("/clients/{}/service-account-user", enc(client)),
                false,
                false,
            ),
            Self::ClientScopes => ("/client-scopes".to_string(), false, false),
            Self::RealmDefaultScopes => ("/default-default-client-scopes".to_string(), false, false),
            Self::RealmOptionalScopes => {
                ("/default-optional-client-scopes".to_string(), false, false)
            }
            Self::ClientDefaultScopes { client } => (
                format!("/clients/{}/default-client-scopes", enc(client)),
                false,
                false,
            ),
            Self::ClientOptionalScopes { client } => (
                format!("/clients/{}/optional-client-scopes", enc(client)),
                false,
                false,
            ),
            Self::AuthenticationFlows => ("/authentication/flows".to_string(), false, false),
            Self::FlowExecutions { alias } => (
                format!("/authentication/flows/{}/executions", enc(alias)),
                false,
                false,
            ),
            Self::IdentityProviders => {
                ("/identity-provider/instances".to_string(), false, false)
            }
            Self::IdpMappers { alias } => (
                format!("/identity-provider/instances/{}/mappers", enc(alias)),
                false,
                false,
            ),
            Self::Components => ("/components".to_string(), false, false),
        };
        Endpoint {
            path,
            paginated,
            full_representation,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clients => write!(f, "clients"),
            Self::RealmRoles => write!(f, "roles"),
            Self::ClientRoles { client } => write!(f, "client-roles[{}]", client),
            Self::RoleComposites { role } => write!(f, "role-composites[{}]", role),
            Self::Groups => write!(f, "groups"),
            Self::GroupChildren { group } => write!(f, "group-children[{}]", group),
            Self::GroupRoleMappings { group } => write!(f, "group-role-mappings[{}]", group),
            Self::Users => write!(f, "users"),
            Self::UserGroups { user } => write!(f, "user-groups[{}]", user),
            Self::UserRoleMappings { user } => write!(f, "user-role-mappings[{}]", user),
            Self::ServiceAccountUser { client } => write!(f, "service-account-user[{}]", client),
            Self::ClientScopes => write!(f, "client-scopes"),
            Self::RealmDefaultScopes => write!(f, "default-default-client-scopes"),
            Self::RealmOptionalScopes => write!(f, "default-optional-client-scopes"),
            Self::ClientDefaultScopes { client } => write!(f, "default-client-scopes[{}]", client),
            Self::ClientOptionalScopes { client } => {
                write!(f, "optional-client-scopes[{}]", client)
            }
            Self::AuthenticationFlows => write!(f, "authentication-flows"),
            Self::FlowExecutions { alias } => write!(f, "flow-executions[{}]", alias),
            Self::IdentityProviders => write!(f, "identity-providers"),
            Self::IdpMappers { alias } => write!(f, "idp-mappers[{}]", alias),
            Self::Components => write!(f, "components"),
        }
    }
}

/// Offset-based page cursor. Strictly increases while a collection is walked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor(usize);

impl Cursor {
    pub fn start() -> Self {
        Self(0)
    }

    pub fn offset(&self) -> usize {
        self.0
    }

    /// Cursor for the page after one that returned `count` records.
    pub fn advance(&self, count: usize) -> Self {
        Self(self.0 + count)
    }
}

/// One page of raw records. `next == None` means the collection is exhausted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<Value>,
    pub next: Option<Cursor>,
}

impl Page {
    pub fn last(records: Vec<Value>) -> Self {
        Self {
            records,
            next: None,
        }
    }
}

/// Everything fetched for one realm, still in wire shape.
///
/// Parent-scoped listings are kept next to the parent id they were fetched for.
#[derive(Debug, Clone, Default)]
pub struct RealmSnapshot {
    pub realm: Value,
    pub clients: Vec<Value>,
    pub realm_roles: Vec<Value>,
    pub client_roles: Vec<Value>,
    /// role id → composite children
    pub composites: Vec<(String, Vec<Value>)>,
    /// flattened group tree (nested `subGroups` removed)
    pub groups: Vec<Value>,
    /// group id → role-mappings object
    pub group_role_mappings: Vec<(String, Value)>,
    pub users: Vec<Value>,
    /// user id → groups
    pub user_groups: Vec<(String, Vec<Value>)>,
    /// user id → role-mappings object
    pub user_role_mappings: Vec<(String, Value)>,
    /// client id → service-account role-mappings object
    pub service_account_role_mappings: Vec<(String, Value)>,
    pub client_scopes: Vec<Value>,
    pub realm_default_scopes: Vec<Value>,
    pub realm_optional_scopes: Vec<Value>,
    /// client id → default scopes
    pub client_default_scopes: Vec<(String, Vec<Value>)>,
    /// client id → optional scopes
    pub client_optional_scopes: Vec<(String, Vec<Value>)>,
    pub flows: Vec<Value>,
    /// flow id → executions, in evaluation order
    pub flow_executions: Vec<(String, Vec<Value>)>,
    pub identity_providers: Vec<Value>,
    /// identity provider internal id → mappers
    pub idp_mappers: Vec<(String, Vec<Value>)>,
    /// user federation, key providers and other realm components
    pub components: Vec<Value>,
}

impl RealmSnapshot {
    pub fn realm_name(&self) -> &str {
        self.realm
            .get("realm")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}
