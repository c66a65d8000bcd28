//! Source reader: fetches batch windows from the primary store.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::core::{truncate, Document, Value};
use crate::error::{MigrateError, Result};
use crate::store::SourceStore;

/// Characters of the identity shown in the connection preview.
const PREVIEW_IDENTITY_CHARS: usize = 20;

/// Characters of the storage date shown in the connection preview.
const PREVIEW_DATE_CHARS: usize = 10;

/// Reads windows of one source collection.
///
/// Cloning is cheap; every worker holds its own reader so each `find`
/// checks out its own pooled connection.
#[derive(Clone)]
pub struct SourceReader {
    store: Arc<dyn SourceStore>,
    collection: String,
    identity_field: String,
}

impl SourceReader {
    pub fn new(
        store: Arc<dyn SourceStore>,
        collection: impl Into<String>,
        identity_field: impl Into<String>,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            identity_field: identity_field.into(),
        }
    }

    /// Read up to `limit` documents starting at `skip`, with `_id` removed.
    ///
    /// Any failure is returned as [`MigrateError::Read`] and logged here;
    /// callers decide what the failed window costs.
    pub async fn read_batch(&self, skip: u64, limit: u64) -> Result<Vec<Document>> {
        if limit == 0 {
            let err = MigrateError::read(skip, limit, "batch limit must be at least 1");
            error!("{}", err);
            return Err(err);
        }

        debug!(
            "Reading {}: skip={}, limit={}",
            self.collection, skip, limit
        );

        match self
            .store
            .find(&self.collection, &Document::new(), skip, limit)
            .await
        {
            Ok(docs) => Ok(docs
                .into_iter()
                .map(|mut doc| {
                    doc.strip_identity();
                    doc
                })
                .collect()),
            Err(e) => {
                let err = MigrateError::read(skip, limit, e);
                error!("{}", err);
                Err(err)
            }
        }
    }

    /// Number of documents in the source collection.
    pub async fn count(&self) -> Result<u64> {
        self.store.count(&self.collection, &Document::new()).await
    }

    /// First document of the collection, `_id` removed.
    pub async fn first_document(&self) -> Result<Option<Document>> {
        let doc = self
            .store
            .find_one(&self.collection, &Document::new())
            .await?;
        Ok(doc.map(|mut d| {
            d.strip_identity();
            d
        }))
    }

    /// Log a short description of the first source document.
    ///
    /// Purely informational: a missing document or a failed read is a warning.
    pub async fn preview_sample(&self) {
        match self.first_document().await {
            Ok(Some(doc)) => {
                info!("Sample record from {}:", self.collection);
                for line in preview_lines(&doc, &self.identity_field) {
                    info!("   {}", line);
                }
            }
            Ok(None) => warn!("No sample record found in {}", self.collection),
            Err(e) => warn!("Could not fetch sample record: {}", e),
        }
    }
}

fn field_or_na(doc: &Document, field: &str) -> String {
    doc.get(field)
        .filter(|v| !v.is_null())
        .map(Value::to_display_string)
        .unwrap_or_else(|| "N/A".to_string())
}

fn nested_len(doc: &Document, parent: &str, child: &str) -> usize {
    doc.get(parent)
        .and_then(Value::as_object)
        .and_then(|o| o.get(child))
        .and_then(Value::as_array)
        .map(|a| a.len())
        .unwrap_or(0)
}

/// Preview lines for a subscriber record.
pub(crate) fn preview_lines(doc: &Document, identity_field: &str) -> Vec<String> {
    let identity = doc
        .identity(identity_field)
        .map(|id| truncate(&id, PREVIEW_IDENTITY_CHARS))
        .unwrap_or_else(|| "N/A".to_string());
    let stored = field_or_na(doc, "dateofStorage");

    vec![
        format!("Identity ({}): {}", identity_field, identity),
        format!("Provider: {}", field_or_na(doc, "provider")),
        format!("Circle ID: {}", field_or_na(doc, "circleID")),
        format!("Status: {}", field_or_na(doc, "status")),
        format!("Storage Date: {}", truncate(&stored, PREVIEW_DATE_CHARS)),
        format!(
            "Products: {}, Services: {}",
            nested_len(doc, "subscribedProductOffering", "product"),
            nested_len(doc, "subscribedProductOffering", "services")
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySource;

    fn reader_over(n: usize) -> (MemorySource, SourceReader) {
        let source = MemorySource::with_documents(
            "subscribers",
            (0..n).map(|i| {
                [("hashMsisdn", format!("HASH{:04}", i))]
                    .into_iter()
                    .collect::<Document>()
            }),
        );
        let reader = SourceReader::new(Arc::new(source.clone()), "subscribers", "hashMsisdn");
        (source, reader)
    }

    #[tokio::test]
    async fn test_read_batch_strips_internal_id() {
        let (_, reader) = reader_over(5);
        let docs = reader.read_batch(1, 3).await.unwrap();
        assert_eq!(docs.len(), 3);
        assert!(docs.iter().all(|d| !d.contains_key("_id")));
        assert_eq!(docs[0].get_str("hashMsisdn"), Some("HASH0001"));
    }

    #[tokio::test]
    async fn test_read_past_end_is_empty() {
        let (_, reader) = reader_over(5);
        assert!(reader.read_batch(10, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_limit_rejected() {
        let (_, reader) = reader_over(5);
        let err = reader.read_batch(0, 0).await.unwrap_err();
        assert!(matches!(err, MigrateError::Read { limit: 0, .. }));
    }

    #[tokio::test]
    async fn test_store_failure_becomes_read_error() {
        let (source, reader) = reader_over(5);
        source.fail_reads_at(2);
        let err = reader.read_batch(2, 2).await.unwrap_err();
        assert!(matches!(err, MigrateError::Read { skip: 2, limit: 2, .. }));
        assert!(reader.read_batch(0, 2).await.is_ok());
    }

    #[test]
    fn test_preview_lines() {
        let doc = Document::from_json(&serde_json::json!({
            "hashMsisdn": "9010C99CA6247F5B0EF606AB8A9C6F1BF38E0F65A788FA02B47DD50569C963FA",
            "provider": "VODAFONE",
            "circleID": "0015",
            "status": "A",
            "dateofStorage": "2020-03-17T19:50:34",
            "subscribedProductOffering": { "product": [{ "id": "1" }, { "id": "2" }] }
        }))
        .unwrap();
        let lines = preview_lines(&doc, "hashMsisdn");
        assert_eq!(lines[0], "Identity (hashMsisdn): 9010C99CA6247F5B0EF6...");
        assert_eq!(lines[4], "Storage Date: 2020-03-17...");
        assert_eq!(lines[5], "Products: 2, Services: 0");
    }

    #[test]
    fn test_preview_lines_missing_fields() {
        let lines = preview_lines(&Document::new(), "hashMsisdn");
        assert_eq!(lines[0], "Identity (hashMsisdn): N/A");
        assert_eq!(lines[1], "Provider: N/A");
    }
}
