//! Graph data models.
//!
//! Defines the canonical, source-independent shape of everything the exporter writes:
//!
//! ## Nodes
//! - [`NodeLabel`]: the node types mirrored from the identity system
//! - [`NodeKey`] / [`NodeRef`]: stable composite keys (`realm` or `realm/id`)
//! - [`NodeRecord`]: label + key + property bag
//!
//! ## Edges
//! - [`EdgeType`] / [`EdgeRecord`]: typed relationships keyed by (type, source, target)
//!
//! ## Run tagging
//! - [`RunId`]: explicit identifier of one export run, threaded to the loader

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Label added to every node written by the exporter; the clean pre-pass only touches these.
pub const EXPORT_MARKER_LABEL: &str = "KcExport";

/// Property holding the run identifier on every exported node and relationship.
pub const RUN_ID_PROPERTY: &str = "kcm_run_id";

// ============================================================================
// Nodes
// ============================================================================

/// Type of entity mirrored from the identity system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeLabel {
    Realm,
    Client,
    Role,
    Group,
    User,
    ClientScope,
    ProtocolMapper,
    AuthenticationFlow,
    AuthenticationExecution,
    IdentityProvider,
    IdpMapper,
    Component,
}

impl NodeLabel {
    pub const ALL: [NodeLabel; 12] = [
        NodeLabel::Realm,
        NodeLabel::Client,
        NodeLabel::Role,
        NodeLabel::Group,
        NodeLabel::User,
        NodeLabel::ClientScope,
        NodeLabel::ProtocolMapper,
        NodeLabel::AuthenticationFlow,
        NodeLabel::AuthenticationExecution,
        NodeLabel::IdentityProvider,
        NodeLabel::IdpMapper,
        NodeLabel::Component,
    ];

    /// Cypher label (also used as the Display form)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Realm => "Realm",
            Self::Client => "Client",
            Self::Role => "Role",
            Self::Group => "Group",
            Self::User => "User",
            Self::ClientScope => "ClientScope",
            Self::ProtocolMapper => "ProtocolMapper",
            Self::AuthenticationFlow => "AuthenticationFlow",
            Self::AuthenticationExecution => "AuthenticationExecution",
            Self::IdentityProvider => "IdentityProvider",
            Self::IdpMapper => "IdpMapper",
            Self::Component => "Component",
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite unique key of a node.
///
/// Realm nodes are keyed by realm name alone; every other node by `realm/source-id`.
/// The string form is stored as the `uid` property and never changes across re-exports.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeKey(String);

impl NodeKey {
    pub fn realm(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn entity(realm: &str, id: &str) -> Self {
        Self(format!("{}/{}", realm, id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A typed reference to a node: label plus key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub label: NodeLabel,
    pub key: NodeKey,
}

impl NodeRef {
    pub fn new(label: NodeLabel, key: NodeKey) -> Self {
        Self { label, key }
    }

    pub fn entity(label: NodeLabel, realm: &str, id: &str) -> Self {
        Self::new(label, NodeKey::entity(realm, id))
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.label, self.key)
    }
}

/// Ordered property bag.
///
/// Values are scalars only (string, number, bool); the normalizer flattens nested objects and
/// serializes lists. Ordering is by key so two bags built from the same record serialize to
/// identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyBag(BTreeMap<String, Value>);

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Canonical JSON form; equal bags give equal strings.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

/// A normalized node ready to be merged into the graph store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub label: NodeLabel,
    pub key: NodeKey,
    pub properties: PropertyBag,
}

impl NodeRecord {
    pub fn node_ref(&self) -> NodeRef {
        NodeRef::new(self.label, self.key.clone())
    }
}

// ============================================================================
// Edges
// ============================================================================

/// Type of relationship between two mirrored entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeType {
    Contains,
    CompositeOf,
    MemberOf,
    ChildOf,
    HasDefaultScope,
    HasOptionalScope,
    HasMapper,
    Executes,
    AssignedRole,
}

impl EdgeType {
    /// Cypher relationship type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "CONTAINS",
            Self::CompositeOf => "COMPOSITE_OF",
            Self::MemberOf => "MEMBER_OF",
            Self::ChildOf => "CHILD_OF",
            Self::HasDefaultScope => "HAS_DEFAULT_SCOPE",
            Self::HasOptionalScope => "HAS_OPTIONAL_SCOPE",
            Self::HasMapper => "HAS_MAPPER",
            Self::Executes => "EXECUTES",
            Self::AssignedRole => "ASSIGNED_ROLE",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A relationship ready to be merged into the graph store.
///
/// Identity is the (type, source, target) triple; properties are refreshed on re-apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub kind: EdgeType,
    pub source: NodeRef,
    pub target: NodeRef,
    pub properties: PropertyBag,
}

impl EdgeRecord {
    pub fn new(kind: EdgeType, source: NodeRef, target: NodeRef) -> Self {
        Self {
            kind,
            source,
            target,
            properties: PropertyBag::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key, value);
        self
    }

    pub fn identity(&self) -> EdgeIdentity {
        (self.kind, self.source.clone(), self.target.clone())
    }
}

/// Merge key of an edge.
pub type EdgeIdentity = (EdgeType, NodeRef, NodeRef);

// ============================================================================
// Run tagging
// ============================================================================

/// Identifier of one export run.
///
/// Passed explicitly to the loader, which stamps it on every node and relationship it writes.
/// It is never part of a [`PropertyBag`], so re-exports of unchanged data stay byte-identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
