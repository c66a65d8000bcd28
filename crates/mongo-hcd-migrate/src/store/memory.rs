//! In-process source and target stores.
//!
//! Both handles are `Arc` + mutex inside, so clones share one dataset just
//! like pooled clients share one server. Fault injection hooks let tests
//! reproduce every failure class the pipeline has to survive.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{Provisioned, SourceStore, TargetCollection, TargetStore};
use crate::config::DEFAULT_IDENTITY_FIELD;
use crate::core::{Document, Value, INTERNAL_ID_FIELD};
use crate::error::{MigrateError, Result};

fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(k, v)| doc.get(k) == Some(v))
}

fn with_internal_id(mut doc: Document) -> Document {
    if !doc.contains_key(INTERNAL_ID_FIELD) {
        doc.insert(INTERNAL_ID_FIELD, Uuid::new_v4().to_string());
    }
    doc
}

async fn simulate_latency(latency: Option<Duration>) {
    if let Some(delay) = latency {
        tokio::time::sleep(delay).await;
    }
}

// --- source ---

#[derive(Default)]
struct SourceState {
    collections: HashMap<String, Vec<Document>>,
    failing_skips: HashSet<u64>,
    panicking_skips: HashSet<u64>,
    fail_ping: bool,
    fail_count: bool,
    latency: Option<Duration>,
    in_flight: usize,
    max_in_flight: usize,
}

/// In-memory source. Documents are returned in insertion order.
#[derive(Clone, Default)]
pub struct MemorySource {
    state: Arc<Mutex<SourceState>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source pre-loaded with `docs` in `collection`.
    pub fn with_documents(collection: &str, docs: impl IntoIterator<Item = Document>) -> Self {
        let source = Self::new();
        for doc in docs {
            source.insert(collection, doc);
        }
        source
    }

    /// Append a document, assigning an `_id` if it has none.
    pub fn insert(&self, collection: &str, doc: Document) {
        self.state
            .lock()
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(with_internal_id(doc));
    }

    /// Make every `find` starting at `skip` fail.
    pub fn fail_reads_at(&self, skip: u64) {
        self.state.lock().failing_skips.insert(skip);
    }

    /// Make every `find` starting at `skip` panic.
    pub fn panic_reads_at(&self, skip: u64) {
        self.state.lock().panicking_skips.insert(skip);
    }

    pub fn fail_ping(&self, fail: bool) {
        self.state.lock().fail_ping = fail;
    }

    pub fn fail_count(&self, fail: bool) {
        self.state.lock().fail_count = fail;
    }

    /// Delay every `find` by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = Some(latency);
    }

    /// Most `find` calls that were ever running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().max_in_flight
    }
}

#[async_trait]
impl SourceStore for MemorySource {
    async fn ping(&self) -> Result<bool> {
        if self.state.lock().fail_ping {
            return Err(MigrateError::connection("memory source", "ping refused"));
        }
        Ok(true)
    }

    async fn count(&self, collection: &str, filter: &Document) -> Result<u64> {
        let state = self.state.lock();
        if state.fail_count {
            return Err(MigrateError::api(503, "count unavailable"));
        }
        Ok(state
            .collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| matches(d, filter)).count() as u64)
            .unwrap_or(0))
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Document,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Document>> {
        let (latency, fail, panic) = {
            let mut state = self.state.lock();
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            (
                state.latency,
                state.failing_skips.contains(&skip),
                state.panicking_skips.contains(&skip),
            )
        };
        simulate_latency(latency).await;
        self.state.lock().in_flight -= 1;
        if panic {
            panic!("injected panic reading window at skip {}", skip);
        }
        if fail {
            return Err(MigrateError::api(500, format!("injected read failure at skip {}", skip)));
        }

        let state = self.state.lock();
        Ok(state
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| matches(d, filter))
                    .skip(usize::try_from(skip).unwrap_or(usize::MAX))
                    .take(usize::try_from(limit).unwrap_or(usize::MAX))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_one(&self, collection: &str, filter: &Document) -> Result<Option<Document>> {
        let state = self.state.lock();
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| matches(d, filter)).cloned()))
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }

    async fn close(&self) {}
}

// --- target ---

struct TargetState {
    identity_field: String,
    keyspaces: HashSet<String>,
    collections: HashMap<String, Vec<Document>>,
    poison: Option<(String, Value)>,
    ordered_bulk: bool,
    fail_bulk: bool,
    fail_ping: bool,
    latency: Option<Duration>,
    insert_many_calls: usize,
    insert_one_calls: usize,
}

impl TargetState {
    /// Check one document against the store's constraints.
    fn check(&self, existing: &[Document], pending: &[Document], doc: &Document) -> Result<()> {
        let identity = doc.identity(&self.identity_field);
        if let Some((field, value)) = &self.poison {
            if doc.get(field) == Some(value) {
                return Err(MigrateError::DocumentWrite {
                    identity: identity.unwrap_or_default(),
                    message: format!("document rejected by store ({} = {})", field, value.to_display_string()),
                });
            }
        }
        if let Some(id) = identity {
            let taken = existing
                .iter()
                .chain(pending)
                .any(|d| d.identity(&self.identity_field).as_deref() == Some(id.as_str()));
            if taken {
                return Err(MigrateError::DuplicateIdentity { identity: id });
            }
        }
        Ok(())
    }
}

/// In-memory target. Enforces uniqueness of the identity field.
#[derive(Clone)]
pub struct MemoryTarget {
    state: Arc<Mutex<TargetState>>,
}

impl Default for MemoryTarget {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY_FIELD)
    }
}

impl MemoryTarget {
    pub fn new(identity_field: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(TargetState {
                identity_field: identity_field.into(),
                keyspaces: HashSet::new(),
                collections: HashMap::new(),
                poison: None,
                ordered_bulk: false,
                fail_bulk: false,
                fail_ping: false,
                latency: None,
                insert_many_calls: 0,
                insert_one_calls: 0,
            })),
        }
    }

    /// Reject any document whose `field` equals `value`.
    pub fn poison(&self, field: impl Into<String>, value: impl Into<Value>) {
        self.state.lock().poison = Some((field.into(), value.into()));
    }

    /// Make `insert_many` commit the prefix before a failing document
    /// instead of rejecting the whole batch.
    pub fn ordered_bulk(&self, ordered: bool) {
        self.state.lock().ordered_bulk = ordered;
    }

    /// Make every `insert_many` fail before writing anything.
    pub fn fail_bulk(&self, fail: bool) {
        self.state.lock().fail_bulk = fail;
    }

    pub fn fail_ping(&self, fail: bool) {
        self.state.lock().fail_ping = fail;
    }

    /// Delay every insert by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = Some(latency);
    }

    /// Snapshot of a collection's documents.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.state
            .lock()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Add a document directly, bypassing constraints.
    pub fn insert_raw(&self, collection: &str, doc: Document) {
        self.state
            .lock()
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(with_internal_id(doc));
    }

    pub fn has_keyspace(&self, name: &str) -> bool {
        self.state.lock().keyspaces.contains(name)
    }

    pub fn insert_many_calls(&self) -> usize {
        self.state.lock().insert_many_calls
    }

    pub fn insert_one_calls(&self) -> usize {
        self.state.lock().insert_one_calls
    }
}

#[async_trait]
impl TargetStore for MemoryTarget {
    async fn ping(&self) -> Result<bool> {
        if self.state.lock().fail_ping {
            return Err(MigrateError::connection("memory target", "ping refused"));
        }
        Ok(true)
    }

    async fn ensure_keyspace(&self, name: &str) -> Result<Provisioned> {
        if self.state.lock().keyspaces.insert(name.to_string()) {
            Ok(Provisioned::Created)
        } else {
            Ok(Provisioned::AlreadyExists)
        }
    }

    async fn create_or_get_collection(
        &self,
        name: &str,
    ) -> Result<(Arc<dyn TargetCollection>, Provisioned)> {
        let provisioned = {
            let mut state = self.state.lock();
            if state.collections.contains_key(name) {
                Provisioned::AlreadyExists
            } else {
                state.collections.insert(name.to_string(), Vec::new());
                Provisioned::Created
            }
        };
        let collection = MemoryCollection {
            state: Arc::clone(&self.state),
            name: name.to_string(),
        };
        Ok((Arc::new(collection), provisioned))
    }

    async fn get_collection(&self, name: &str) -> Result<Option<Arc<dyn TargetCollection>>> {
        if !self.state.lock().collections.contains_key(name) {
            return Ok(None);
        }
        let collection = MemoryCollection {
            state: Arc::clone(&self.state),
            name: name.to_string(),
        };
        Ok(Some(Arc::new(collection)))
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}

/// Collection handle returned by [`MemoryTarget`].
pub struct MemoryCollection {
    state: Arc<Mutex<TargetState>>,
    name: String,
}

#[async_trait]
impl TargetCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_many(&self, documents: &[Document]) -> Result<usize> {
        let latency = self.state.lock().latency;
        simulate_latency(latency).await;

        let mut state = self.state.lock();
        state.insert_many_calls += 1;
        if state.fail_bulk {
            return Err(MigrateError::bulk_write(0, "bulk insert unavailable"));
        }

        let existing = state.collections.get(&self.name).cloned().unwrap_or_default();
        let mut accepted: Vec<Document> = Vec::with_capacity(documents.len());
        let mut failure = None;
        for doc in documents {
            if let Err(e) = state.check(&existing, &accepted, doc) {
                failure = Some(e);
                break;
            }
            accepted.push(with_internal_id(doc.clone()));
        }

        match failure {
            None => {
                let n = accepted.len();
                state.collections.entry(self.name.clone()).or_default().extend(accepted);
                Ok(n)
            }
            Some(e) if state.ordered_bulk => {
                let n = accepted.len();
                state.collections.entry(self.name.clone()).or_default().extend(accepted);
                Err(MigrateError::bulk_write(n, e))
            }
            Some(e) => Err(MigrateError::bulk_write(0, e)),
        }
    }

    async fn insert_one(&self, document: &Document) -> Result<String> {
        let latency = self.state.lock().latency;
        simulate_latency(latency).await;

        let mut state = self.state.lock();
        state.insert_one_calls += 1;
        let existing = state.collections.get(&self.name).cloned().unwrap_or_default();
        state.check(&existing, &[], document)?;

        let doc = with_internal_id(document.clone());
        let id = doc
            .get(INTERNAL_ID_FIELD)
            .map(Value::to_display_string)
            .unwrap_or_default();
        state.collections.entry(self.name.clone()).or_default().push(doc);
        Ok(id)
    }

    async fn find_one(&self, filter: &Document) -> Result<Option<Document>> {
        let state = self.state.lock();
        Ok(state
            .collections
            .get(&self.name)
            .and_then(|docs| docs.iter().find(|d| matches(d, filter)).cloned()))
    }

    async fn count(&self, filter: &Document) -> Result<u64> {
        let state = self.state.lock();
        Ok(state
            .collections
            .get(&self.name)
            .map(|docs| docs.iter().filter(|d| matches(d, filter)).count() as u64)
            .unwrap_or(0))
    }
}
