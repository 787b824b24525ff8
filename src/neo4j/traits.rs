//! GraphStore trait definition
//!
//! Defines the write interface the loader needs from a graph database, so the pipeline can run
//! against Neo4j in production and an in-memory mock in tests.

use crate::graph::RunId;
use crate::neo4j::models::{CleanStats, WriteBatch};
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create uniqueness constraints and indexes (idempotent)
    async fn init_schema(&self) -> Result<()>;

    /// Delete every node carrying the export marker label, with its relationships, in one
    /// transaction. Data written by anything else is left alone.
    async fn clean(&self, run: RunId) -> Result<CleanStats>;

    /// Merge a batch of nodes or edges in one transaction, tagging each with `run`.
    ///
    /// On error nothing from the batch is visible.
    async fn apply_batch(&self, run: RunId, batch: &WriteBatch) -> Result<()>;

    /// Upper bound on concurrent write transactions (the connection pool size)
    fn max_concurrent_writes(&self) -> usize;
}
