//! Core document model used by every stage of the pipeline.
//!
//! - [`value`]: tagged-union field value with BSON/JSON conversions
//! - [`document`]: insertion-ordered document and identity helpers

pub mod document;
pub mod value;

pub use document::{truncate, Document, INTERNAL_ID_FIELD};
pub use value::Value;
