//! Neo4j client for the exported identity graph

use super::models::{CleanStats, WriteBatch};
use super::traits::GraphStore;
use crate::graph::{
    EdgeRecord, EdgeType, NodeLabel, NodeRecord, PropertyBag, RunId, EXPORT_MARKER_LABEL,
    RUN_ID_PROPERTY,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use neo4rs::{query, BoltType, ConfigBuilder, Graph, Query};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Client for Neo4j operations
pub struct Neo4jClient {
    graph: Arc<Graph>,
    max_connections: usize,
}

impl Neo4jClient {
    /// Connect to Neo4j with a bounded connection pool
    pub async fn new(
        uri: &str,
        user: &str,
        password: &str,
        database: &str,
        max_connections: usize,
    ) -> Result<Self> {
        let max_connections = max_connections.max(1);
        let config = ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .db(database)
            .max_connections(max_connections)
            .build()
            .context("Invalid Neo4j configuration")?;

        let graph = Graph::connect(config)
            .await
            .context("Failed to connect to Neo4j")?;

        Ok(Self {
            graph: Arc::new(graph),
            max_connections,
        })
    }

    /// Execute a counting query returning a single `n` column
    async fn count(&self, q: Query) -> Result<u64> {
        let mut result = self.graph.execute(q).await?;
        let mut total = 0;
        if let Some(row) = result.next().await? {
            total = row.get::<i64>("n")?.max(0) as u64;
        }
        Ok(total)
    }
}

// ============================================================================
// Cypher builders
// ============================================================================

fn merge_nodes_cypher(label: NodeLabel) -> String {
    format!(
        r#"
        UNWIND $rows AS row
        MERGE (n:{label} {{uid: row.uid}})
        SET n = row.props, n.uid = row.uid, n.{run} = $run_id
        SET n:{marker}
        "#,
        label = label.as_str(),
        run = RUN_ID_PROPERTY,
        marker = EXPORT_MARKER_LABEL,
    )
}

fn merge_edges_cypher(kind: EdgeType, source: NodeLabel, target: NodeLabel) -> String {
    format!(
        r#"
        UNWIND $rows AS row
        MATCH (a:{source} {{uid: row.source}})
        MATCH (b:{target} {{uid: row.target}})
        MERGE (a)-[r:{kind}]->(b)
        SET r = row.props, r.{run} = $run_id
        "#,
        source = source.as_str(),
        target = target.as_str(),
        kind = kind.as_str(),
        run = RUN_ID_PROPERTY,
    )
}

// ============================================================================
// Bolt conversion
// ============================================================================

fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Bool(b) => BoltType::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::from(i),
            None => BoltType::from(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => BoltType::from(s.clone()),
        // Bags only hold scalars; anything else is stored as text rather than dropped.
        Value::Null => BoltType::from(String::new()),
        other => BoltType::from(other.to_string()),
    }
}

fn bag_to_bolt(bag: &PropertyBag) -> HashMap<String, BoltType> {
    bag.iter().map(|(k, v)| (k.clone(), to_bolt(v))).collect()
}

fn node_row(node: &NodeRecord) -> HashMap<String, BoltType> {
    let mut row = HashMap::new();
    row.insert("uid".to_string(), BoltType::from(node.key.as_str().to_string()));
    row.insert("props".to_string(), BoltType::from(bag_to_bolt(&node.properties)));
    row
}

fn edge_row(edge: &EdgeRecord) -> HashMap<String, BoltType> {
    let mut row = HashMap::new();
    row.insert(
        "source".to_string(),
        BoltType::from(edge.source.key.as_str().to_string()),
    );
    row.insert(
        "target".to_string(),
        BoltType::from(edge.target.key.as_str().to_string()),
    );
    row.insert("props".to_string(), BoltType::from(bag_to_bolt(&edge.properties)));
    row
}

/// One parameterized UNWIND query per node label and per (edge type, endpoint labels) group.
fn batch_queries(run: RunId, batch: &WriteBatch) -> Vec<Query> {
    let run_id = run.to_string();

    let mut nodes: BTreeMap<NodeLabel, Vec<HashMap<String, BoltType>>> = BTreeMap::new();
    for node in &batch.nodes {
        nodes.entry(node.label).or_default().push(node_row(node));
    }

    let mut edges: BTreeMap<(EdgeType, NodeLabel, NodeLabel), Vec<HashMap<String, BoltType>>> =
        BTreeMap::new();
    for edge in &batch.edges {
        edges
            .entry((edge.kind, edge.source.label, edge.target.label))
            .or_default()
            .push(edge_row(edge));
    }

    let node_queries = nodes.into_iter().map(|(label, rows)| {
        query(&merge_nodes_cypher(label))
            .param("rows", rows)
            .param("run_id", run_id.clone())
    });
    let edge_queries = edges.into_iter().map(|((kind, source, target), rows)| {
        query(&merge_edges_cypher(kind, source, target))
            .param("rows", rows)
            .param("run_id", run_id.clone())
    });

    node_queries.chain(edge_queries).collect()
}

#[async_trait]
impl GraphStore for Neo4jClient {
    async fn init_schema(&self) -> Result<()> {
        for label in NodeLabel::ALL {
            let constraint = format!(
                "CREATE CONSTRAINT {}_uid IF NOT EXISTS FOR (n:{}) REQUIRE n.uid IS UNIQUE",
                label.as_str().to_lowercase(),
                label.as_str()
            );
            if let Err(e) = self.graph.run(query(&constraint)).await {
                tracing::warn!("Constraint may already exist: {}", e);
            }
        }

        let indexes = [
            format!(
                "CREATE INDEX kc_export_run IF NOT EXISTS FOR (n:{}) ON (n.{})",
                EXPORT_MARKER_LABEL, RUN_ID_PROPERTY
            ),
            "CREATE INDEX role_name IF NOT EXISTS FOR (r:Role) ON (r.name)".to_string(),
            "CREATE INDEX client_client_id IF NOT EXISTS FOR (c:Client) ON (c.client_id)"
                .to_string(),
            "CREATE INDEX user_username IF NOT EXISTS FOR (u:User) ON (u.username)".to_string(),
            "CREATE INDEX group_path IF NOT EXISTS FOR (g:Group) ON (g.path)".to_string(),
            "CREATE INDEX idp_alias IF NOT EXISTS FOR (i:IdentityProvider) ON (i.alias)"
                .to_string(),
        ];
        for index in indexes {
            if let Err(e) = self.graph.run(query(&index)).await {
                tracing::warn!("Index may already exist: {}", e);
            }
        }

        Ok(())
    }

    async fn clean(&self, run: RunId) -> Result<CleanStats> {
        let nodes_deleted = self
            .count(query(&format!(
                "MATCH (n:{}) RETURN count(n) AS n",
                EXPORT_MARKER_LABEL
            )))
            .await
            .context("Failed to count exported nodes")?;

        let mut txn = self.graph.start_txn().await?;
        let delete = query(&format!("MATCH (n:{}) DETACH DELETE n", EXPORT_MARKER_LABEL));
        if let Err(e) = txn.run(delete).await {
            let _ = txn.rollback().await;
            return Err(e).context("Clean pre-pass failed");
        }
        txn.commit().await.context("Clean pre-pass commit failed")?;

        tracing::info!(run = %run, nodes_deleted, "Removed previously exported data");
        Ok(CleanStats { nodes_deleted })
    }

    async fn apply_batch(&self, run: RunId, batch: &WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let queries = batch_queries(run, batch);
        let mut txn = self.graph.start_txn().await?;
        if let Err(e) = txn.run_queries(queries).await {
            let _ = txn.rollback().await;
            return Err(e).with_context(|| {
                format!("Batch {} of realm '{}' rolled back", batch.index, batch.realm)
            });
        }
        txn.commit()
            .await
            .with_context(|| format!("Batch {} of realm '{}' failed to commit", batch.index, batch.realm))?;
        Ok(())
    }

    fn max_concurrent_writes(&self) -> usize {
        self.max_connections
    }
}
