//! Source client for the identity system's admin API
//!
//! [`SourceClient`] fetches one page at a time; [`drain`] walks a collection to the end while
//! guarding against pagination that never terminates.

pub mod client;
pub mod credentials;
pub mod models;
pub mod retry;
pub mod traits;

pub use client::KeycloakClient;
pub use credentials::{AuthMode, CredentialProvider, OidcTokenProvider, StaticToken};
pub use models::*;
pub use retry::RetryPolicy;
pub use traits::SourceClient;

#[cfg(test)]
pub(crate) mod mock;

use crate::error::ExportError;
use serde_json::Value;

/// Default upper bound on pages fetched for a single collection
pub const DEFAULT_MAX_PAGES: usize = 10_000;

/// Fetch every record of a collection.
///
/// Stops when a page reports no successor. Fails with `PaginationExhausted` when the cursor does
/// not strictly advance or `max_pages` pages have been read without reaching the end.
pub async fn drain(
    source: &dyn SourceClient,
    realm: &str,
    collection: &Collection,
    max_pages: usize,
) -> Result<Vec<Value>, ExportError> {
    let mut records = Vec::new();
    let mut cursor = Cursor::start();
    let mut pages = 0usize;

    loop {
        if pages >= max_pages {
            return Err(ExportError::PaginationExhausted {
                realm: realm.to_string(),
                collection: collection.to_string(),
                pages,
                last_cursor: cursor.offset(),
            });
        }

        let page = source.fetch_collection(realm, collection, cursor).await?;
        pages += 1;
        records.extend(page.records);

        match page.next {
            None => return Ok(records),
            Some(next) if next > cursor => cursor = next,
            Some(next) => {
                return Err(ExportError::PaginationExhausted {
                    realm: realm.to_string(),
                    collection: collection.to_string(),
                    pages,
                    last_cursor: next.offset(),
                });
            }
        }
    }
}
