//! Graph loader
//!
//! Applies a realm's nodes and edges to a [`GraphStore`] in bounded batches. Nodes go first so
//! every edge batch finds its endpoints. Batches of one realm are applied strictly in sequence;
//! different realms share a semaphore sized to the store's connection pool.

use crate::error::{Issue, IssueKind};
use crate::graph::{EdgeIdentity, EdgeRecord, NodeRecord, NodeRef, RunId};
use crate::neo4j::{GraphStore, WriteBatch};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default number of records per write transaction
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Per-kind record counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadCounts {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Outcome of loading one realm.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadResult {
    pub nodes: LoadCounts,
    pub edges: LoadCounts,
    pub batches: usize,
    pub failed_batches: usize,
    /// Batches never started because the run was cancelled
    pub drained_batches: usize,
    pub issues: Vec<Issue>,
}

impl LoadResult {
    pub fn applied(&self) -> usize {
        self.nodes.applied + self.edges.applied
    }

    pub fn skipped(&self) -> usize {
        self.nodes.skipped + self.edges.skipped
    }

    pub fn failed(&self) -> usize {
        self.nodes.failed + self.edges.failed
    }

    /// Every batch that was attempted failed.
    pub fn all_failed(&self) -> bool {
        self.failed_batches > 0 && self.failed_batches + self.drained_batches == self.batches
    }

    fn counts_mut(&mut self, batch: &WriteBatch) -> &mut LoadCounts {
        if batch.nodes.is_empty() {
            &mut self.edges
        } else {
            &mut self.nodes
        }
    }
}

pub struct GraphLoader {
    store: Arc<dyn GraphStore>,
    batch_size: usize,
    permits: Arc<Semaphore>,
}

impl GraphLoader {
    pub fn new(store: Arc<dyn GraphStore>, batch_size: usize) -> Self {
        let permits = Arc::new(Semaphore::new(store.max_concurrent_writes().max(1)));
        Self {
            store,
            batch_size: batch_size.max(1),
            permits,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Load one realm.
    ///
    /// Duplicate records are counted as skipped. A failed batch is retried once, then reported
    /// as a `LoadFailed` issue; later batches still run. Edges touching a node from a failed
    /// batch are never sent and count as failed. Once `cancel` fires, batches not yet started
    /// are counted as skipped and drained.
    pub async fn apply(
        &self,
        run: RunId,
        realm: &str,
        nodes: Vec<NodeRecord>,
        edges: Vec<EdgeRecord>,
        cancel: &CancellationToken,
    ) -> LoadResult {
        let mut result = LoadResult::default();

        let mut seen_nodes: HashSet<NodeRef> = HashSet::new();
        let total_nodes = nodes.len();
        let unique_nodes: Vec<NodeRecord> = nodes
            .into_iter()
            .filter(|n| seen_nodes.insert(n.node_ref()))
            .collect();
        result.nodes.skipped = total_nodes - unique_nodes.len();

        let mut seen_edges: HashSet<EdgeIdentity> = HashSet::new();
        let total_edges = edges.len();
        let unique_edges: Vec<EdgeRecord> = edges
            .into_iter()
            .filter(|e| seen_edges.insert(e.identity()))
            .collect();
        result.edges.skipped = total_edges - unique_edges.len();

        let batches = self.plan_batches(realm, unique_nodes, unique_edges);
        result.batches = batches.len();

        // Nodes whose batch never landed
        let mut unwritten: HashSet<NodeRef> = HashSet::new();

        for mut batch in batches {
            if cancel.is_cancelled() {
                result.drained_batches += 1;
                result.counts_mut(&batch).skipped += batch.len();
                continue;
            }

            if !batch.edges.is_empty() && !unwritten.is_empty() {
                let (kept, orphaned): (Vec<EdgeRecord>, Vec<EdgeRecord>) =
                    batch.edges.into_iter().partition(|e| {
                        !unwritten.contains(&e.source) && !unwritten.contains(&e.target)
                    });
                batch.edges = kept;
                if !orphaned.is_empty() {
                    warn!(
                        realm = %realm,
                        batch = batch.index,
                        edges = orphaned.len(),
                        "Withholding edges whose endpoints failed to load"
                    );
                    result.edges.failed += orphaned.len();
                    result.issues.push(Issue::new(
                        IssueKind::LoadFailed,
                        format!(
                            "batch {} ({} edges): endpoint nodes were not written",
                            batch.index,
                            orphaned.len()
                        ),
                    ));
                }
                if batch.edges.is_empty() {
                    result.failed_batches += 1;
                    continue;
                }
            }

            match self.apply_with_retry(run, &batch).await {
                Ok(()) => {
                    result.counts_mut(&batch).applied += batch.len();
                }
                Err(e) => {
                    warn!(
                        realm = %realm,
                        batch = batch.index,
                        records = batch.len(),
                        error = %e,
                        "Batch failed after retry"
                    );
                    result.failed_batches += 1;
                    result.counts_mut(&batch).failed += batch.len();
                    unwritten.extend(batch.nodes.iter().map(|n| n.node_ref()));
                    result.issues.push(Issue::new(
                        IssueKind::LoadFailed,
                        format!("batch {} ({} records): {}", batch.index, batch.len(), e),
                    ));
                }
            }
        }

        debug!(
            realm = %realm,
            applied = result.applied(),
            skipped = result.skipped(),
            failed = result.failed(),
            "Realm load finished"
        );
        result
    }

    fn plan_batches(
        &self,
        realm: &str,
        nodes: Vec<NodeRecord>,
        edges: Vec<EdgeRecord>,
    ) -> Vec<WriteBatch> {
        let node_batches = nodes.chunks(self.batch_size).map(|chunk| WriteBatch {
            nodes: chunk.to_vec(),
            ..Default::default()
        });
        let edge_batches = edges.chunks(self.batch_size).map(|chunk| WriteBatch {
            edges: chunk.to_vec(),
            ..Default::default()
        });
        node_batches
            .chain(edge_batches)
            .enumerate()
            .map(|(index, batch)| WriteBatch {
                realm: realm.to_string(),
                index,
                ..batch
            })
            .collect()
    }

    async fn apply_with_retry(&self, run: RunId, batch: &WriteBatch) -> anyhow::Result<()> {
        match self.apply_once(run, batch).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(
                    realm = %batch.realm,
                    batch = batch.index,
                    error = %e,
                    "Batch rolled back, retrying once"
                );
                self.apply_once(run, batch).await
            }
        }
    }

    async fn apply_once(&self, run: RunId, batch: &WriteBatch) -> anyhow::Result<()> {
        // Held for the duration of the transaction and released on every path.
        let _permit = self.permits.acquire().await?;
        self.store.apply_batch(run, batch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeType, NodeKey, NodeLabel, PropertyBag};
    use crate::neo4j::mock::MockGraphStore;

    fn user(id: &str) -> NodeRecord {
        let mut properties = PropertyBag::new();
        properties.insert("id", id);
        NodeRecord {
            label: NodeLabel::User,
            key: NodeKey::entity("acme", id),
            properties,
        }
    }

    fn users(n: usize) -> Vec<NodeRecord> {
        (0..n).map(|i| user(&format!("u{}", i))).collect()
    }

    #[tokio::test]
    async fn test_batches_are_bounded() {
        let store = Arc::new(MockGraphStore::new());
        let loader = GraphLoader::new(store.clone(), 2);

        let result = loader
            .apply(RunId::new(), "acme", users(5), vec![], &CancellationToken::new())
            .await;

        assert_eq!(result.batches, 3);
        assert_eq!(result.nodes.applied, 5);
        assert_eq!(store.apply_calls(), 3);
        assert_eq!(store.node_count().await, 5);
    }

    #[tokio::test]
    async fn test_duplicates_are_skipped() {
        let store = Arc::new(MockGraphStore::new());
        let loader = GraphLoader::new(store.clone(), 10);
        let mut nodes = users(2);
        nodes.push(user("u0"));
        let edge = EdgeRecord::new(
            EdgeType::MemberOf,
            NodeRef::entity(NodeLabel::User, "acme", "u0"),
            NodeRef::entity(NodeLabel::User, "acme", "u1"),
        );

        let result = loader
            .apply(
                RunId::new(),
                "acme",
                nodes,
                vec![edge.clone(), edge],
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.nodes.applied, 2);
        assert_eq!(result.nodes.skipped, 1);
        assert_eq!(result.edges.applied, 1);
        assert_eq!(result.edges.skipped, 1);
    }

    #[tokio::test]
    async fn test_failed_batch_is_retried_once() {
        let store = Arc::new(MockGraphStore::new());
        store.fail_batch("acme", 1, 1);
        let loader = GraphLoader::new(store.clone(), 2);

        let result = loader
            .apply(RunId::new(), "acme", users(4), vec![], &CancellationToken::new())
            .await;

        assert_eq!(result.nodes.applied, 4);
        assert_eq!(result.failed_batches, 0);
        assert!(result.issues.is_empty());
        assert_eq!(store.apply_calls(), 3);
    }

    #[tokio::test]
    async fn test_twice_failed_batch_is_reported_and_others_continue() {
        let store = Arc::new(MockGraphStore::new());
        store.fail_batch("acme", 0, 2);
        let loader = GraphLoader::new(store.clone(), 2);

        let result = loader
            .apply(RunId::new(), "acme", users(4), vec![], &CancellationToken::new())
            .await;

        assert_eq!(result.nodes.applied, 2);
        assert_eq!(result.nodes.failed, 2);
        assert_eq!(result.failed_batches, 1);
        assert!(!result.all_failed());
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].kind, IssueKind::LoadFailed);
        assert!(result.issues[0].detail.starts_with("batch 0"));
        // failed batch left nothing behind
        assert!(store.node("User", "acme/u0").await.is_none());
        assert!(store.node("User", "acme/u2").await.is_some());
    }

    #[tokio::test]
    async fn test_edges_to_unwritten_nodes_count_as_failed() {
        let store = Arc::new(MockGraphStore::new());
        store.fail_batch("acme", 0, 2);
        let loader = GraphLoader::new(store.clone(), 2);
        let member = |from: &str, to: &str| {
            EdgeRecord::new(
                EdgeType::MemberOf,
                NodeRef::entity(NodeLabel::User, "acme", from),
                NodeRef::entity(NodeLabel::User, "acme", to),
            )
        };

        // u0 and u1 are in the failing batch; u2 and u3 land.
        let result = loader
            .apply(
                RunId::new(),
                "acme",
                users(4),
                vec![member("u0", "u2"), member("u2", "u3")],
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.edges.applied, 1);
        assert_eq!(result.edges.failed, 1);
        assert_eq!(store.edge_count().await, 1);
        assert_eq!(result.failed(), 3);
        assert_eq!(result.issues.len(), 2);
        assert!(result.issues[1].detail.contains("endpoint nodes were not written"));
    }

    #[tokio::test]
    async fn test_edge_batch_with_only_unwritten_endpoints_is_not_sent() {
        let store = Arc::new(MockGraphStore::new());
        store.fail_batch("acme", 0, 2);
        let loader = GraphLoader::new(store.clone(), 10);
        let edge = EdgeRecord::new(
            EdgeType::MemberOf,
            NodeRef::entity(NodeLabel::User, "acme", "u0"),
            NodeRef::entity(NodeLabel::User, "acme", "u1"),
        );

        let result = loader
            .apply(RunId::new(), "acme", users(2), vec![edge], &CancellationToken::new())
            .await;

        assert_eq!(result.edges.failed, 1);
        assert_eq!(result.edges.applied, 0);
        assert!(result.all_failed());
        // both attempts of the node batch, and no edge batch
        assert_eq!(store.apply_calls(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_load_drains_remaining_batches() {
        let store = Arc::new(MockGraphStore::new());
        let loader = GraphLoader::new(store.clone(), 2);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = loader
            .apply(RunId::new(), "acme", users(3), vec![], &cancel)
            .await;

        assert_eq!(result.drained_batches, 2);
        assert_eq!(result.nodes.skipped, 3);
        assert_eq!(result.applied(), 0);
        assert_eq!(store.apply_calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_realms_respect_pool_size() {
        let store = Arc::new(
            MockGraphStore::new()
                .with_max_writes(2)
                .with_write_delay(std::time::Duration::from_millis(20)),
        );
        let loader = Arc::new(GraphLoader::new(store.clone(), 1));
        let cancel = CancellationToken::new();
        let run = RunId::new();

        let loads = (0..5).map(|i| {
            let loader = loader.clone();
            let cancel = cancel.clone();
            async move {
                let realm = format!("realm{}", i);
                loader.apply(run, &realm, users(2), vec![], &cancel).await
            }
        });
        let results = futures::future::join_all(loads).await;

        assert!(results.iter().all(|r| r.nodes.applied == 2));
        assert!(store.peak_in_flight() <= 2);
    }
}
