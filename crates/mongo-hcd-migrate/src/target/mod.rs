//! Target writer: bulk insert with per-document fallback.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::core::Document;
use crate::error::MigrateError;
use crate::store::TargetCollection;

/// Characters of the identity shown in per-document error lines.
const ERROR_IDENTITY_CHARS: usize = 16;

/// Log label of a batch, e.g. `BATCH_007`.
pub fn batch_label(batch_number: u64) -> String {
    format!("BATCH_{:03}", batch_number)
}

/// Outcome of writing one batch. `migrated + failed` equals the input size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub migrated: u64,
    pub failed: u64,
    /// Whether the per-document path was taken.
    pub used_fallback: bool,
}

/// Writes batches into one target collection.
#[derive(Clone)]
pub struct TargetWriter {
    collection: Arc<dyn TargetCollection>,
    identity_field: String,
}

impl TargetWriter {
    pub fn new(collection: Arc<dyn TargetCollection>, identity_field: impl Into<String>) -> Self {
        Self {
            collection,
            identity_field: identity_field.into(),
        }
    }

    /// Write `documents`, returning how many landed in the target.
    ///
    /// Tries one bulk insert first. If that fails, the documents the store
    /// reports as already committed count as migrated and the rest are
    /// inserted one at a time in order. Per-document failures are logged
    /// and counted, never returned.
    pub async fn write_batch(&self, documents: &[Document], batch_number: u64) -> WriteSummary {
        if documents.is_empty() {
            return WriteSummary::default();
        }

        let label = batch_label(batch_number);
        let total = documents.len() as u64;

        let committed = match self.collection.insert_many(documents).await {
            Ok(inserted) => {
                let migrated = (inserted as u64).min(total);
                info!(
                    "{} completed: {}/{} documents written successfully",
                    label, migrated, total
                );
                return WriteSummary {
                    migrated,
                    failed: total - migrated,
                    used_fallback: false,
                };
            }
            Err(MigrateError::BulkWrite { inserted, message }) => {
                warn!(
                    "{}: bulk insert failed after {} documents, falling back to individual inserts: {}",
                    label, inserted, message
                );
                inserted.min(documents.len())
            }
            Err(e) => {
                warn!(
                    "{}: bulk insert failed, falling back to individual inserts: {}",
                    label, e
                );
                0
            }
        };

        let mut migrated = committed as u64;
        for doc in &documents[committed..] {
            match self.collection.insert_one(doc).await {
                Ok(_) => migrated += 1,
                Err(e) => {
                    error!(
                        "{}: Failed to write document {}: {}",
                        label,
                        doc.identity_prefix(&self.identity_field, ERROR_IDENTITY_CHARS),
                        e
                    );
                    debug!("{}: Failed document: {}", label, doc);
                }
            }
        }

        info!(
            "{} completed: {}/{} documents written successfully",
            label, migrated, total
        );
        WriteSummary {
            migrated,
            failed: total - migrated,
            used_fallback: true,
        }
    }
}
