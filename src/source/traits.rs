//! SourceClient trait definition
//!
//! Abstract read-only interface over the identity system's admin API, so the pipeline can be
//! driven by [`KeycloakClient`](super::KeycloakClient) in production and by fixtures in tests.

use crate::error::ExportError;
use crate::source::models::{Collection, Cursor, Page};
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Realm representations visible to the authenticated principal
    async fn list_realms(&self) -> Result<Vec<Value>, ExportError>;

    /// Fetch one page of a collection, starting at `cursor`
    async fn fetch_collection(
        &self,
        realm: &str,
        collection: &Collection,
        cursor: Cursor,
    ) -> Result<Page, ExportError>;
}
