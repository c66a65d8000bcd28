//! Capability interfaces for the two document stores.
//!
//! The pipeline only ever talks to these traits. Implementations:
//!
//! - [`mongo::MongoSource`]: primary store (MongoDB), read side
//! - [`data_api::DataApiTarget`]: secondary store (DataStax HCD Data API), write side
//! - [`memory`]: in-process source and target used by tests and demos
//!
//! Handles are cheap to clone (`Arc` inside) and backed by pooled clients,
//! so every worker holds its own handle and each request checks out its
//! own connection.

pub mod data_api;
pub mod memory;
pub mod mongo;

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::Document;
use crate::error::Result;

pub use data_api::{DataApiCredentials, DataApiTarget};
pub use memory::{MemorySource, MemoryTarget};
pub use mongo::MongoSource;

/// Outcome of an idempotent provisioning call (keyspace or collection).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    /// The resource did not exist and was created.
    Created,
    /// The resource already existed and is reused as-is.
    AlreadyExists,
}

impl Provisioned {
    /// Lowercase label for log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provisioned::Created => "created",
            Provisioned::AlreadyExists => "already exists",
        }
    }
}

/// Read side of a migration.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Round-trip check against the server.
    async fn ping(&self) -> Result<bool>;

    /// Count documents matching `filter` (empty filter counts everything).
    async fn count(&self, collection: &str, filter: &Document) -> Result<u64>;

    /// Read up to `limit` documents starting at offset `skip`.
    ///
    /// Implementations must return a stable order across calls so that
    /// consecutive windows are well-defined.
    async fn find(
        &self,
        collection: &str,
        filter: &Document,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Document>>;

    /// Fetch the first document matching `filter`, in store order.
    async fn find_one(&self, collection: &str, filter: &Document) -> Result<Option<Document>>;

    /// Store name for logging.
    fn store_type(&self) -> &'static str;

    /// Release client resources.
    async fn close(&self);
}

/// Write side of a migration.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Round-trip check against the server.
    async fn ping(&self) -> Result<bool>;

    /// Make sure the keyspace exists.
    async fn ensure_keyspace(&self, name: &str) -> Result<Provisioned>;

    /// Create the collection, or open it if it already exists.
    async fn create_or_get_collection(
        &self,
        name: &str,
    ) -> Result<(Arc<dyn TargetCollection>, Provisioned)>;

    /// Open the collection only if it already exists. Never creates anything.
    async fn get_collection(&self, name: &str) -> Result<Option<Arc<dyn TargetCollection>>>;

    /// Store name for logging.
    fn store_type(&self) -> &'static str;
}

/// A collection in the target store.
#[async_trait]
pub trait TargetCollection: Send + Sync {
    /// Collection name.
    fn name(&self) -> &str;

    /// Insert all documents in one call.
    ///
    /// On failure returns [`MigrateError::BulkWrite`](crate::MigrateError::BulkWrite)
    /// whose `inserted` field says how many leading documents were committed
    /// before the store gave up (0 for atomic stores).
    async fn insert_many(&self, documents: &[Document]) -> Result<usize>;

    /// Insert a single document, returning the id the store assigned.
    async fn insert_one(&self, document: &Document) -> Result<String>;

    /// Fetch the first document matching `filter`.
    async fn find_one(&self, filter: &Document) -> Result<Option<Document>>;

    /// Count documents matching `filter`.
    async fn count(&self, filter: &Document) -> Result<u64>;
}
