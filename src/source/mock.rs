//! In-memory fixture implementation of SourceClient for testing.
//!
//! Collections are registered per realm either as a flat record list (paged by `page_size`
//! for paginated collections) or as explicit pages. Unregistered collections are empty.
//! Every fetch is counted so tests can assert on call volume.

use crate::error::ExportError;
use crate::source::models::{Collection, Cursor, Page};
use crate::source::traits::SourceClient;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

enum Fixture {
    Records(Vec<Value>),
    Pages(Vec<Vec<Value>>),
}

pub(crate) struct FixtureSource {
    realms: Vec<Value>,
    fixtures: HashMap<(String, Collection), Fixture>,
    failures: HashMap<(String, Collection), ExportError>,
    list_failure: Option<ExportError>,
    page_size: usize,
    calls: Mutex<HashMap<(String, Collection), usize>>,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self {
            realms: Vec::new(),
            fixtures: HashMap::new(),
            failures: HashMap::new(),
            list_failure: None,
            page_size: 2,
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_realm(mut self, realm: Value) -> Self {
        self.realms.push(realm);
        self
    }

    pub fn with_collection(mut self, realm: &str, collection: Collection, records: Vec<Value>) -> Self {
        self.fixtures
            .insert((realm.to_string(), collection), Fixture::Records(records));
        self
    }

    pub fn with_pages(mut self, realm: &str, collection: Collection, pages: Vec<Vec<Value>>) -> Self {
        self.fixtures
            .insert((realm.to_string(), collection), Fixture::Pages(pages));
        self
    }

    pub fn fail_collection(mut self, realm: &str, collection: Collection, err: ExportError) -> Self {
        self.failures.insert((realm.to_string(), collection), err);
        self
    }

    pub fn fail_list(mut self, err: ExportError) -> Self {
        self.list_failure = Some(err);
        self
    }

    pub fn calls_for(&self, realm: &str, collection: &Collection) -> usize {
        self.calls
            .lock()
            .map(|calls| {
                calls
                    .get(&(realm.to_string(), collection.clone()))
                    .copied()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.values().sum())
            .unwrap_or(0)
    }

    fn page_of(&self, fixture: Option<&Fixture>, paginated: bool, cursor: Cursor) -> Page {
        let records = match fixture {
            None => Vec::new(),
            Some(Fixture::Records(all)) if !paginated => all.clone(),
            Some(Fixture::Records(all)) => all
                .iter()
                .skip(cursor.offset())
                .take(self.page_size)
                .cloned()
                .collect(),
            Some(Fixture::Pages(pages)) => {
                let mut offset = 0;
                let mut found = Vec::new();
                for page in pages {
                    if offset == cursor.offset() {
                        found = page.clone();
                        break;
                    }
                    offset += page.len();
                }
                found
            }
        };

        let explicit_pages = matches!(fixture, Some(Fixture::Pages(_)));
        let next = if (paginated || explicit_pages) && !records.is_empty() {
            Some(cursor.advance(records.len()))
        } else {
            None
        };
        Page { records, next }
    }
}

#[async_trait]
impl SourceClient for FixtureSource {
    async fn list_realms(&self) -> Result<Vec<Value>, ExportError> {
        match &self.list_failure {
            Some(err) => Err(err.clone()),
            None => Ok(self.realms.clone()),
        }
    }

    async fn fetch_collection(
        &self,
        realm: &str,
        collection: &Collection,
        cursor: Cursor,
    ) -> Result<Page, ExportError> {
        let key = (realm.to_string(), collection.clone());
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(key.clone()).or_insert(0) += 1;
        }

        if let Some(err) = self.failures.get(&key) {
            return Err(err.clone());
        }

        Ok(self.page_of(
            self.fixtures.get(&key),
            collection.endpoint().paginated,
            cursor,
        ))
    }
}
