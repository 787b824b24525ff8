//! Keycloak admin REST client
//!
//! Every request goes through [`KeycloakClient::get_json`], which owns the retry loop:
//! transient statuses and transport errors are retried per [`RetryPolicy`], a 401 invalidates the
//! bearer token and is retried once with a fresh one, any other 4xx is final.

use crate::error::ExportError;
use crate::source::credentials::CredentialProvider;
use crate::source::models::{Collection, Cursor, Page};
use crate::source::retry::RetryPolicy;
use crate::source::traits::SourceClient;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default page size for paginated collections
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// HTTP client for the Keycloak admin API.
pub struct KeycloakClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
    retry: RetryPolicy,
    page_size: usize,
}

impl KeycloakClient {
    pub fn new(
        base_url: &str,
        credentials: Arc<dyn CredentialProvider>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            retry: RetryPolicy::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn realm_url(&self, realm: &str, path: &str) -> String {
        format!(
            "{}/admin/realms/{}{}",
            self.base_url,
            urlencoding::encode(realm),
            path
        )
    }

    /// GET a JSON document with retry and token refresh.
    ///
    /// `realm` and `collection` only label errors and log lines.
    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        realm: &str,
        collection: &str,
    ) -> Result<Value, ExportError> {
        let mut attempt = 0u32;
        let mut token_refreshed = false;

        loop {
            attempt += 1;
            let token = self.credentials.bearer_token().await?;

            debug!(url = %url, attempt = attempt, "Sending admin API request");

            let response = self
                .http
                .get(url)
                .query(query)
                .bearer_auth(token)
                .send()
                .await;

            let response = match response {
                Ok(resp) => resp,
                Err(e) => {
                    if self.retry.allows_retry(attempt) {
                        let delay = self.retry.backoff(attempt);
                        warn!(
                            realm = %realm,
                            collection = %collection,
                            attempt = attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Request failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(ExportError::Transport {
                        realm: realm.to_string(),
                        collection: collection.to_string(),
                        message: format!("{} (after {} attempts)", e, attempt),
                    });
                }
            };

            let status = response.status();
            debug!(url = %url, status = %status, attempt = attempt, "Received admin API response");

            if status.is_success() {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| ExportError::Transport {
                        realm: realm.to_string(),
                        collection: collection.to_string(),
                        message: format!("failed to read response body: {}", e),
                    })?;
                if body.is_empty() {
                    return Ok(Value::Null);
                }
                return serde_json::from_slice(&body).map_err(|e| ExportError::Transport {
                    realm: realm.to_string(),
                    collection: collection.to_string(),
                    message: format!("invalid JSON response: {}", e),
                });
            }

            if status == StatusCode::UNAUTHORIZED {
                if token_refreshed {
                    return Err(ExportError::AuthFailure {
                        reason: format!(
                            "{} in realm '{}' rejected a freshly issued token",
                            collection, realm
                        ),
                    });
                }
                warn!(realm = %realm, collection = %collection, "Bearer token rejected, refreshing");
                self.credentials.invalidate().await;
                token_refreshed = true;
                // The refresh does not consume the transient-retry budget.
                attempt -= 1;
                continue;
            }

            if self.retry.is_transient(status) {
                if self.retry.allows_retry(attempt) {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        realm = %realm,
                        collection = %collection,
                        status = status.as_u16(),
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient status, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(ExportError::Transport {
                    realm: realm.to_string(),
                    collection: collection.to_string(),
                    message: format!("HTTP {} after {} attempts", status.as_u16(), attempt),
                });
            }

            return Err(ExportError::SourceRejected {
                realm: realm.to_string(),
                collection: collection.to_string(),
                status: status.as_u16(),
            });
        }
    }
}

/// Turn a response body into records: arrays are taken as-is, a single object is one record.
fn into_records(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

#[async_trait]
impl SourceClient for KeycloakClient {
    async fn list_realms(&self) -> Result<Vec<Value>, ExportError> {
        let url = format!("{}/admin/realms", self.base_url);
        let body = self.get_json(&url, &[], "*", "realms").await?;
        Ok(into_records(body))
    }

    async fn fetch_collection(
        &self,
        realm: &str,
        collection: &Collection,
        cursor: Cursor,
    ) -> Result<Page, ExportError> {
        let endpoint = collection.endpoint();
        let url = self.realm_url(realm, &endpoint.path);

        let mut query = Vec::new();
        if endpoint.paginated {
            query.push(("first", cursor.offset().to_string()));
            query.push(("max", self.page_size.to_string()));
        }
        if endpoint.full_representation {
            query.push(("briefRepresentation", "false".to_string()));
        }

        let label = collection.to_string();
        let body = self.get_json(&url, &query, realm, &label).await?;
        let records = into_records(body);

        debug!(
            realm = %realm,
            collection = %label,
            offset = cursor.offset(),
            records = records.len(),
            "Fetched page"
        );

        // An empty page ends a paginated walk; unpaginated collections are a single page.
        if endpoint.paginated && !records.is_empty() {
            let next = Some(cursor.advance(records.len()));
            Ok(Page { records, next })
        } else {
            Ok(Page::last(records))
        }
    }
}
