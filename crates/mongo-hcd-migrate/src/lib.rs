//! # mongo-hcd-migrate
//!
//! Batch migration of document collections from MongoDB to DataStax HCD
//! (through its JSON Data API).
//!
//! The source collection is split into contiguous `skip`/`limit` windows.
//! A bounded pool of workers reads each window and writes it to the target:
//!
//! - **Bulk first**: one `insertMany` per batch
//! - **Per-document fallback** when the bulk insert fails, so a single bad
//!   record only costs itself
//! - **Shared progress** aggregated under one lock
//! - **Verification** of counts and a key-field sample after the run
//!
//! ## Example
//!
//! ```rust,no_run
//! use mongo_hcd_migrate::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> mongo_hcd_migrate::Result<()> {
//!     let config = Config::from_env()?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let summary = orchestrator.run(CancellationToken::new()).await?;
//!     println!("Migrated {} documents", summary.total_migrated);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod source;
pub mod store;
pub mod target;
pub mod transfer;
pub mod verify;

// Re-exports for convenient access
pub use config::{mask_uri, Config, MigrationConfig, SourceConfig, TargetConfig};
pub use crate::core::{Document, Value};
pub use error::{MigrateError, Result};
pub use orchestrator::{HealthCheckResult, Orchestrator, SeedResult};
pub use progress::{MigrationSummary, ProgressSnapshot, ProgressTracker, RunStatus};
pub use source::SourceReader;
pub use store::{
    DataApiTarget, MemorySource, MemoryTarget, MongoSource, Provisioned, SourceStore,
    TargetCollection, TargetStore,
};
pub use target::{TargetWriter, WriteSummary};
pub use transfer::{plan_batches, BatchResult, BatchSpec, TransferEngine};
pub use verify::{FieldMismatch, VerificationReport, Verifier};
