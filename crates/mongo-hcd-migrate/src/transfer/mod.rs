//! Batch planning and per-batch transfer.
//!
//! A run is split into contiguous `skip`/`limit` windows over the source
//! collection. Each window is one unit of work: read it, write it, report
//! how many documents landed and how many were dropped.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::source::SourceReader;
use crate::target::{batch_label, TargetWriter};

/// One batch window: `limit` documents starting at offset `skip`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSpec {
    /// 1-based batch number.
    pub batch_number: u64,
    pub skip: u64,
    pub limit: u64,
}

impl BatchSpec {
    pub fn label(&self) -> String {
        batch_label(self.batch_number)
    }
}

/// Outcome of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_number: u64,
    pub migrated: u64,
    pub errors: u64,
}

impl BatchResult {
    /// Result for a batch whose whole window was lost.
    ///
    /// A read failure or a panicked worker charges every planned document as
    /// an error, so dropped documents are never silent. A read that succeeds
    /// but comes back empty is `(0, 0)` instead.
    pub fn failed(batch: &BatchSpec) -> Self {
        Self {
            batch_number: batch.batch_number,
            migrated: 0,
            errors: batch.limit,
        }
    }
}

/// Partition `total` documents into windows of `batch_size`.
///
/// Windows are contiguous and non-overlapping, the last one truncated.
/// Yields nothing for `total == 0` or `batch_size == 0`.
pub fn plan_batches(total: u64, batch_size: u64) -> Vec<BatchSpec> {
    if total == 0 || batch_size == 0 {
        return Vec::new();
    }
    let count = total.div_ceil(batch_size);
    (0..count)
        .map(|i| {
            let skip = i * batch_size;
            BatchSpec {
                batch_number: i + 1,
                skip,
                limit: batch_size.min(total - skip),
            }
        })
        .collect()
}

/// Moves one batch from source to target.
#[derive(Clone)]
pub struct TransferEngine {
    reader: SourceReader,
    writer: TargetWriter,
}

impl TransferEngine {
    pub fn new(reader: SourceReader, writer: TargetWriter) -> Self {
        Self { reader, writer }
    }

    /// Read then write one window. Never fails: read errors cost the whole
    /// window, write errors cost only the documents that were dropped.
    pub async fn execute(&self, batch: BatchSpec) -> BatchResult {
        let label = batch.label();
        info!(
            "{}: processing documents {} to {}",
            label,
            batch.skip + 1,
            batch.skip + batch.limit
        );

        let documents = match self.reader.read_batch(batch.skip, batch.limit).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!("{}: read failed, counting {} documents as errors: {}", label, batch.limit, e);
                return BatchResult::failed(&batch);
            }
        };

        if documents.is_empty() {
            warn!("{}: batch empty, skipping", label);
            return BatchResult {
                batch_number: batch.batch_number,
                migrated: 0,
                errors: 0,
            };
        }

        info!("{}: read {} documents from source", label, documents.len());
        let summary = self.writer.write_batch(&documents, batch.batch_number).await;

        BatchResult {
            batch_number: batch.batch_number,
            migrated: summary.migrated,
            errors: summary.failed,
        }
    }
}
