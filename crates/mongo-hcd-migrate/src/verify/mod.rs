//! Post-migration verification.
//!
//! Two checks, both observational (nothing is repaired):
//!
//! - **Counts**: source collection size equals target collection size.
//! - **Sample**: the first source document exists in the target under the
//!   same identity and agrees on the configured key fields.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::core::{truncate, Document};
use crate::source::SourceReader;
use crate::store::TargetCollection;

/// Characters of the identity shown in verification log lines.
const IDENTITY_LOG_CHARS: usize = 16;

/// A key field whose value differs between the two stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMismatch {
    pub field: String,
    pub source: serde_json::Value,
    pub target: serde_json::Value,
}

/// Outcome of a verification pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub counts_match: bool,
    pub sample_fields_match: bool,
    /// `None` when the count could not be read.
    pub source_count: Option<u64>,
    pub target_count: Option<u64>,
    /// Identity of the sampled document, if one was found.
    pub sample_identity: Option<String>,
    #[serde(default)]
    pub field_mismatches: Vec<FieldMismatch>,
}

impl VerificationReport {
    /// Report for a target collection that does not exist.
    pub fn target_missing(source_count: Option<u64>) -> Self {
        Self {
            counts_match: false,
            sample_fields_match: false,
            source_count,
            target_count: None,
            sample_identity: None,
            field_mismatches: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.counts_match && self.sample_fields_match
    }

    /// One-line description of what differed, `None` when the report passed.
    pub fn failure_summary(&self) -> Option<String> {
        if self.passed() {
            return None;
        }
        let count = |c: Option<u64>| c.map_or_else(|| "unavailable".to_string(), |n| n.to_string());
        let mut parts = Vec::new();
        if !self.counts_match {
            parts.push(format!(
                "document counts differ (source: {}, target: {})",
                count(self.source_count),
                count(self.target_count)
            ));
        }
        if !self.sample_fields_match {
            if self.field_mismatches.is_empty() {
                parts.push("sample document missing from target".to_string());
            } else {
                let fields: Vec<&str> =
                    self.field_mismatches.iter().map(|m| m.field.as_str()).collect();
                parts.push(format!("sample fields differ: {}", fields.join(", ")));
            }
        }
        Some(parts.join("; "))
    }
}

struct SampleCheck {
    matched: bool,
    identity: Option<String>,
    mismatches: Vec<FieldMismatch>,
}

/// Compares a source collection against its migrated target collection.
pub struct Verifier {
    source: SourceReader,
    target: Arc<dyn TargetCollection>,
    identity_field: String,
    key_fields: Vec<String>,
}

impl Verifier {
    pub fn new(
        source: SourceReader,
        target: Arc<dyn TargetCollection>,
        identity_field: impl Into<String>,
        key_fields: Vec<String>,
    ) -> Self {
        Self {
            source,
            target,
            identity_field: identity_field.into(),
            key_fields,
        }
    }

    /// Run both checks and log the verdict.
    pub async fn verify(&self) -> VerificationReport {
        info!("Starting migration verification...");

        let (counts_match, source_count, target_count) = self.verify_counts().await;
        let sample = self.verify_sample().await;

        let report = VerificationReport {
            counts_match,
            sample_fields_match: sample.matched,
            source_count,
            target_count,
            sample_identity: sample.identity,
            field_mismatches: sample.mismatches,
        };

        if report.passed() {
            info!("Migration verification PASSED");
        } else {
            error!("Migration verification FAILED");
        }
        report
    }

    async fn verify_counts(&self) -> (bool, Option<u64>, Option<u64>) {
        let source_count = match self.source.count().await {
            Ok(n) => n,
            Err(e) => {
                error!("Error counting source documents: {}", e);
                return (false, None, None);
            }
        };
        let target_count = match self.target.count(&Document::new()).await {
            Ok(n) => n,
            Err(e) => {
                error!("Error counting target documents: {}", e);
                return (false, Some(source_count), None);
            }
        };

        info!("Source documents: {}", source_count);
        info!("Target documents: {}", target_count);

        if source_count == target_count {
            info!("Document counts match");
            (true, Some(source_count), Some(target_count))
        } else {
            error!(
                "Document count mismatch: source={}, target={}",
                source_count, target_count
            );
            (false, Some(source_count), Some(target_count))
        }
    }

    async fn verify_sample(&self) -> SampleCheck {
        let pass = |identity| SampleCheck {
            matched: true,
            identity,
            mismatches: Vec::new(),
        };
        let fail = |identity| SampleCheck {
            matched: false,
            identity,
            mismatches: Vec::new(),
        };

        let source_doc = match self.source.first_document().await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                warn!("No documents found in source");
                return pass(None);
            }
            Err(e) => {
                error!("Error fetching sample document: {}", e);
                return fail(None);
            }
        };

        let Some(identity) = source_doc.identity(&self.identity_field) else {
            error!(
                "Sample document has no {}, cannot look it up in target",
                self.identity_field
            );
            return fail(None);
        };
        let short = truncate(&identity, IDENTITY_LOG_CHARS);

        let mut filter = Document::new();
        if let Some(value) = source_doc.get(&self.identity_field) {
            filter.insert(self.identity_field.clone(), value.clone());
        }

        let mut target_doc = match self.target.find_one(&filter).await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                error!("Sample document not found in target ({})", short);
                return fail(Some(identity));
            }
            Err(e) => {
                error!("Error fetching sample document from target: {}", e);
                return fail(Some(identity));
            }
        };
        target_doc.strip_identity();

        let mismatches = compare_fields(&source_doc, &target_doc, &self.key_fields);
        for m in &mismatches {
            warn!(
                "Field mismatch '{}': source='{}' vs target='{}'",
                m.field, m.source, m.target
            );
        }

        if mismatches.is_empty() {
            info!("Sample document verification passed ({})", short);
        } else {
            error!(
                "Sample document verification failed: {}/{} fields match",
                self.key_fields.len() - mismatches.len(),
                self.key_fields.len()
            );
        }

        SampleCheck {
            matched: mismatches.is_empty(),
            identity: Some(identity),
            mismatches,
        }
    }
}

/// Fields of `fields` whose values differ. A field missing on both sides matches.
fn compare_fields(source: &Document, target: &Document, fields: &[String]) -> Vec<FieldMismatch> {
    let to_json = |doc: &Document, f: &str| {
        doc.get(f)
            .map(|v| v.to_json())
            .unwrap_or(serde_json::Value::Null)
    };
    fields
        .iter()
        .filter(|f| source.get(f) != target.get(f))
        .map(|f| FieldMismatch {
            field: f.clone(),
            source: to_json(source, f),
            target: to_json(target, f),
        })
        .collect()
}
