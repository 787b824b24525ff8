//! In-memory mock implementation of GraphStore for testing.
//!
//! Mirrors the Neo4j merge semantics closely enough to test idempotence and clean isolation:
//! nodes are keyed by (label, uid) and their properties replaced on merge, edges are keyed by
//! (type, source, target) and only created when both endpoints exist. Batches are validated
//! before anything is written, so an injected failure leaves no partial state.
//! Conditionally compiled with `#[cfg(test)]`.

use crate::graph::{RunId, EXPORT_MARKER_LABEL, RUN_ID_PROPERTY};
use crate::neo4j::models::{CleanStats, WriteBatch};
use crate::neo4j::traits::GraphStore;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// (label, uid)
pub type MockNodeKey = (String, String);
/// (type, source, target)
pub type MockEdgeKey = (String, MockNodeKey, MockNodeKey);

#[derive(Debug, Clone, PartialEq)]
pub struct MockNode {
    pub labels: BTreeSet<String>,
    pub properties: BTreeMap<String, Value>,
}

/// Comparable view of the stored graph with run tags removed.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphState {
    pub nodes: BTreeMap<MockNodeKey, MockNode>,
    pub edges: BTreeMap<MockEdgeKey, BTreeMap<String, Value>>,
}

/// In-memory mock implementation of GraphStore for testing.
pub struct MockGraphStore {
    pub nodes: RwLock<HashMap<MockNodeKey, MockNode>>,
    pub edges: RwLock<HashMap<MockEdgeKey, BTreeMap<String, Value>>>,

    max_writes: usize,
    write_delay: Option<Duration>,
    fail_clean: AtomicBool,
    /// (realm, batch index) → remaining injected failures
    batch_failures: std::sync::Mutex<HashMap<(String, usize), usize>>,

    apply_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockGraphStore {
    /// Create a new empty MockGraphStore.
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            edges: RwLock::new(HashMap::new()),
            max_writes: 4,
            write_delay: None,
            fail_clean: AtomicBool::new(false),
            batch_failures: std::sync::Mutex::new(HashMap::new()),
            apply_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_max_writes(mut self, max_writes: usize) -> Self {
        self.max_writes = max_writes;
        self
    }

    /// Make every batch take at least `delay`, to observe concurrency.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn fail_clean(&self) {
        self.fail_clean.store(true, Ordering::SeqCst);
    }

    /// Fail batch `index` of `realm` the next `times` times it is applied.
    pub fn fail_batch(&self, realm: &str, index: usize, times: usize) {
        if let Ok(mut failures) = self.batch_failures.lock() {
            failures.insert((realm.to_string(), index), times);
        }
    }

    /// Insert a node that was not written by the exporter.
    pub async fn seed_foreign_node(&self, label: &str, uid: &str) {
        let mut properties = BTreeMap::new();
        properties.insert("uid".to_string(), Value::from(uid));
        self.nodes.write().await.insert(
            (label.to_string(), uid.to_string()),
            MockNode {
                labels: BTreeSet::from([label.to_string()]),
                properties,
            },
        );
    }

    /// Insert a relationship that was not written by the exporter.
    pub async fn seed_foreign_edge(&self, kind: &str, source: (&str, &str), target: (&str, &str)) {
        self.edges.write().await.insert(
            (
                kind.to_string(),
                (source.0.to_string(), source.1.to_string()),
                (target.0.to_string(), target.1.to_string()),
            ),
            BTreeMap::new(),
        );
    }

    pub async fn node_count(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn edge_count(&self) -> usize {
        self.edges.read().await.len()
    }

    pub async fn node(&self, label: &str, uid: &str) -> Option<MockNode> {
        self.nodes
            .read()
            .await
            .get(&(label.to_string(), uid.to_string()))
            .cloned()
    }

    pub async fn edges_of_type(&self, kind: &str) -> Vec<MockEdgeKey> {
        let mut keys: Vec<MockEdgeKey> = self
            .edges
            .read()
            .await
            .keys()
            .filter(|(t, _, _)| t == kind)
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub async fn state(&self) -> GraphState {
        let nodes = self
            .nodes
            .read()
            .await
            .iter()
            .map(|(k, n)| {
                let mut n = n.clone();
                n.properties.remove(RUN_ID_PROPERTY);
                (k.clone(), n)
            })
            .collect();
        let edges = self
            .edges
            .read()
            .await
            .iter()
            .map(|(k, props)| {
                let mut props = props.clone();
                props.remove(RUN_ID_PROPERTY);
                (k.clone(), props)
            })
            .collect();
        GraphState { nodes, edges }
    }

    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn take_injected_failure(&self, batch: &WriteBatch) -> bool {
        let Ok(mut failures) = self.batch_failures.lock() else {
            return false;
        };
        match failures.get_mut(&(batch.realm.clone(), batch.index)) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    async fn write(&self, run: RunId, batch: &WriteBatch) -> Result<()> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        if self.take_injected_failure(batch) {
            return Err(anyhow!(
                "injected failure for batch {} of realm '{}'",
                batch.index,
                batch.realm
            ));
        }

        let run_id = Value::from(run.to_string());
        let mut nodes = self.nodes.write().await;
        for node in &batch.nodes {
            let mut properties: BTreeMap<String, Value> = node
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            properties.insert("uid".to_string(), Value::from(node.key.as_str()));
            properties.insert(RUN_ID_PROPERTY.to_string(), run_id.clone());
            nodes.insert(
                (node.label.to_string(), node.key.to_string()),
                MockNode {
                    labels: BTreeSet::from([
                        node.label.to_string(),
                        EXPORT_MARKER_LABEL.to_string(),
                    ]),
                    properties,
                },
            );
        }

        let mut edges = self.edges.write().await;
        for edge in &batch.edges {
            let source = (edge.source.label.to_string(), edge.source.key.to_string());
            let target = (edge.target.label.to_string(), edge.target.key.to_string());
            if !nodes.contains_key(&source) || !nodes.contains_key(&target) {
                continue;
            }
            let mut properties: BTreeMap<String, Value> = edge
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            properties.insert(RUN_ID_PROPERTY.to_string(), run_id.clone());
            edges.insert((edge.kind.to_string(), source, target), properties);
        }
        Ok(())
    }
}

impl Default for MockGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for MockGraphStore {
    async fn init_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn clean(&self, _run: RunId) -> Result<CleanStats> {
        if self.fail_clean.load(Ordering::SeqCst) {
            return Err(anyhow!("injected clean failure"));
        }
        let mut nodes = self.nodes.write().await;
        let mut edges = self.edges.write().await;

        let doomed: BTreeSet<MockNodeKey> = nodes
            .iter()
            .filter(|(_, n)| n.labels.contains(EXPORT_MARKER_LABEL))
            .map(|(k, _)| k.clone())
            .collect();
        edges.retain(|(_, s, t), _| !doomed.contains(s) && !doomed.contains(t));
        for key in &doomed {
            nodes.remove(key);
        }

        Ok(CleanStats {
            nodes_deleted: doomed.len() as u64,
        })
    }

    async fn apply_batch(&self, run: RunId, batch: &WriteBatch) -> Result<()> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = self.write(run, batch).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn max_concurrent_writes(&self) -> usize {
        self.max_writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeRecord, EdgeType, NodeKey, NodeLabel, NodeRecord, NodeRef, PropertyBag};

    fn user(id: &str) -> NodeRecord {
        NodeRecord {
            label: NodeLabel::User,
            key: NodeKey::entity("acme", id),
            properties: PropertyBag::new(),
        }
    }

    #[tokio::test]
    async fn test_clean_keeps_foreign_edges_on_shared_uids() {
        let store = MockGraphStore::new();
        let batch = WriteBatch {
            realm: "acme".into(),
            nodes: vec![user("u0"), user("u1")],
            ..Default::default()
        };
        store.apply_batch(RunId::new(), &batch).await.unwrap();
        let edges = WriteBatch {
            realm: "acme".into(),
            index: 1,
            edges: vec![EdgeRecord::new(
                EdgeType::MemberOf,
                NodeRef::entity(NodeLabel::User, "acme", "u0"),
                NodeRef::entity(NodeLabel::User, "acme", "u1"),
            )],
            ..Default::default()
        };
        store.apply_batch(RunId::new(), &edges).await.unwrap();

        // A foreign pair reusing an exported uid under another label
        store.seed_foreign_node("Account", "acme/u0").await;
        store.seed_foreign_node("Ledger", "books").await;
        store
            .seed_foreign_edge("OWNS", ("Account", "acme/u0"), ("Ledger", "books"))
            .await;

        let stats = store.clean(RunId::new()).await.unwrap();

        assert_eq!(stats.nodes_deleted, 2);
        assert!(store.edges_of_type("MEMBER_OF").await.is_empty());
        assert_eq!(
            store.edges_of_type("OWNS").await,
            vec![(
                "OWNS".to_string(),
                ("Account".to_string(), "acme/u0".to_string()),
                ("Ledger".to_string(), "books".to_string()),
            )]
        );
        assert!(store.node("Account", "acme/u0").await.is_some());
    }
}
