//! Configuration type definitions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::mask_uri;

/// Domain identity of a subscriber record.
pub const DEFAULT_IDENTITY_FIELD: &str = "hashMsisdn";

/// Fields compared on the verification sample.
pub const DEFAULT_VERIFY_FIELDS: [&str; 4] = ["provider", "subscriptionType", "status", "circleID"];

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Source store (MongoDB) configuration.
    #[serde(default)]
    pub source: SourceConfig,

    /// Target store (DataStax HCD) configuration.
    #[serde(default)]
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source store (MongoDB) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Connection string (default: "mongodb://localhost:27017/").
    #[serde(default = "default_mongo_uri")]
    pub uri: String,

    /// Database name (default: "vil_dxl_dds").
    #[serde(default = "default_mongo_database")]
    pub database: String,

    /// Collection to migrate (default: "subscribers").
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Server selection timeout in seconds (default: 10).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Driver connection pool size. Driver default if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pool_size: Option<u32>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            uri: default_mongo_uri(),
            database: default_mongo_database(),
            collection: default_collection(),
            connect_timeout_secs: default_connect_timeout(),
            max_pool_size: None,
        }
    }
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("uri", &mask_uri(&self.uri))
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("max_pool_size", &self.max_pool_size)
            .finish()
    }
}

/// Target store (DataStax HCD Data API) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Data API base URL, e.g. "http://localhost:8181".
    #[serde(default)]
    pub endpoint: String,

    /// Username.
    #[serde(default)]
    pub username: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Keyspace (default: "default_keyspace").
    #[serde(default = "default_keyspace")]
    pub keyspace: String,

    /// Collection to write (default: "subscribers").
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            username: String::new(),
            password: String::new(),
            keyspace: default_keyspace(),
            collection: default_collection(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl std::fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetConfig")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("keyspace", &self.keyspace)
            .field("collection", &self.collection)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Documents per batch (default: 100).
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Concurrent batch workers (default: 10). 1 selects sequential mode.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Upper bound on documents migrated in one run (default: 10000, 0 = no cap).
    #[serde(default = "default_max_documents")]
    pub max_documents: u64,

    /// Pause between batches in sequential mode, in milliseconds (default: 1000).
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Domain identity field (default: "hashMsisdn").
    #[serde(default = "default_identity_field")]
    pub identity_field: String,

    /// Fields compared on the verification sample.
    #[serde(default = "default_verify_fields")]
    pub verify_fields: Vec<String>,

    /// Run verification after the migration (default: false).
    #[serde(default)]
    pub verify_after: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            workers: default_workers(),
            max_documents: default_max_documents(),
            batch_delay_ms: default_batch_delay_ms(),
            identity_field: default_identity_field(),
            verify_fields: default_verify_fields(),
            verify_after: false,
        }
    }
}

impl MigrationConfig {
    /// Document cap for the run, `None` when uncapped.
    pub fn document_cap(&self) -> Option<u64> {
        (self.max_documents > 0).then_some(self.max_documents)
    }

    /// Documents to migrate given the source size.
    pub fn effective_total(&self, source_count: u64) -> u64 {
        match self.document_cap() {
            Some(cap) => source_count.min(cap),
            None => source_count,
        }
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// Whether batches run inline instead of on the worker pool.
    pub fn is_sequential(&self) -> bool {
        self.workers <= 1
    }
}

// Default value functions for serde
fn default_mongo_uri() -> String {
    "mongodb://localhost:27017/".to_string()
}

fn default_mongo_database() -> String {
    "vil_dxl_dds".to_string()
}

fn default_collection() -> String {
    "subscribers".to_string()
}

fn default_keyspace() -> String {
    "default_keyspace".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

fn default_batch_size() -> u64 {
    100
}

fn default_workers() -> usize {
    10
}

fn default_max_documents() -> u64 {
    10_000
}

fn default_batch_delay_ms() -> u64 {
    1_000
}

fn default_identity_field() -> String {
    DEFAULT_IDENTITY_FIELD.to_string()
}

fn default_verify_fields() -> Vec<String> {
    DEFAULT_VERIFY_FIELDS.iter().map(|f| f.to_string()).collect()
}
