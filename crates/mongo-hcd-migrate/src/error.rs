//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, bad env values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A store could not be reached at startup.
    #[error("Connection to {store} failed: {message}")]
    Connection { store: String, message: String },

    /// A batch window could not be read from the source.
    #[error("Read failed (skip: {skip}, limit: {limit}): {message}")]
    Read {
        skip: u64,
        limit: u64,
        message: String,
    },

    /// The whole-batch insert failed. `inserted` leading documents were
    /// committed by the store before the failure.
    #[error("Bulk insert failed after {inserted} documents: {message}")]
    BulkWrite { inserted: usize, message: String },

    /// A single document could not be inserted.
    #[error("Failed to write document {identity}: {message}")]
    DocumentWrite { identity: String, message: String },

    /// A document with the same domain identity already exists in the target.
    #[error("Document {identity} already exists in target")]
    DuplicateIdentity { identity: String },

    /// Post-migration verification found differences.
    #[error("Verification failed: {0}")]
    Verification(String),

    /// MongoDB driver error
    #[error("Source database error: {0}")]
    Source(#[from] mongodb::error::Error),

    /// HTTP transport error talking to the Data API
    #[error("Target database error: {0}")]
    Target(#[from] reqwest::Error),

    /// The Data API answered with an error payload or status.
    #[error("Data API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Connection error for the named store.
    pub fn connection(store: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Connection {
            store: store.into(),
            message: message.to_string(),
        }
    }

    /// Create a Read error for a batch window.
    pub fn read(skip: u64, limit: u64, message: impl ToString) -> Self {
        MigrateError::Read {
            skip,
            limit,
            message: message.to_string(),
        }
    }

    /// Create a BulkWrite error.
    pub fn bulk_write(inserted: usize, message: impl ToString) -> Self {
        MigrateError::BulkWrite {
            inserted,
            message: message.to_string(),
        }
    }

    /// Create an Api error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        MigrateError::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether this error belongs to the ConnectionError class (fatal at startup).
    pub fn is_connection(&self) -> bool {
        matches!(self, MigrateError::Connection { .. })
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
