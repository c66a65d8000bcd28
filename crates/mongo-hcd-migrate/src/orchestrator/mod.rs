//! Migration orchestrator - main workflow coordinator.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{mask_uri, Config};
use crate::core::Document;
use crate::error::{MigrateError, Result};
use crate::progress::{MigrationSummary, ProgressTracker};
use crate::source::SourceReader;
use crate::store::{
    DataApiTarget, MongoSource, SourceStore, TargetCollection, TargetStore,
};
use crate::target::TargetWriter;
use crate::transfer::{plan_batches, BatchResult, BatchSpec, TransferEngine};
use crate::verify::{VerificationReport, Verifier};

/// Migration orchestrator.
///
/// Owns one handle per store for the whole process; workers get clones.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn SourceStore>,
    target: Arc<dyn TargetStore>,
}

/// Reachability of both stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_ok: bool,
    pub target_ok: bool,
    /// Source connection string with the password hidden.
    pub source_uri: String,
    pub target_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_error: Option<String>,
}

impl HealthCheckResult {
    pub fn healthy(&self) -> bool {
        self.source_ok && self.target_ok
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Outcome of inserting the sample document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedResult {
    pub inserted_id: String,
    pub identity: Option<String>,
    /// Whether the document could be read back by identity.
    pub found: bool,
}

impl Orchestrator {
    /// Validate the config and connect to both stores.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let source = MongoSource::connect(&config.source).await?;
        let target = DataApiTarget::connect(&config.target).await?;
        Ok(Self {
            config,
            source: Arc::new(source),
            target: Arc::new(target),
        })
    }

    /// Build around already-connected stores.
    pub fn with_stores(
        config: Config,
        source: Arc<dyn SourceStore>,
        target: Arc<dyn TargetStore>,
    ) -> Self {
        Self {
            config,
            source,
            target,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn reader(&self) -> SourceReader {
        SourceReader::new(
            Arc::clone(&self.source),
            self.config.source.collection.clone(),
            self.config.migration.identity_field.clone(),
        )
    }

    /// Ensure keyspace and collection exist and return the collection.
    async fn prepare_target(&self) -> Result<Arc<dyn TargetCollection>> {
        let keyspace = &self.config.target.keyspace;
        let provisioned = self.target.ensure_keyspace(keyspace).await?;
        info!("Keyspace '{}': {}", keyspace, provisioned.as_str());

        let name = &self.config.target.collection;
        let (collection, provisioned) = self.target.create_or_get_collection(name).await?;
        info!("Collection '{}': {}", name, provisioned.as_str());
        Ok(collection)
    }

    /// Run the migration.
    pub async fn run(&self, cancel: CancellationToken) -> Result<MigrationSummary> {
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(
            "Starting migration run: {} ({} -> {})",
            run_id,
            self.source.store_type(),
            self.target.store_type()
        );

        let collection = self.prepare_target().await?;
        let reader = self.reader();
        reader.preview_sample().await;

        let source_count = reader.count().await?;
        let total = self.config.migration.effective_total(source_count);
        info!(
            "Source has {} documents, migrating {}",
            source_count, total
        );

        let plan = plan_batches(total, self.config.migration.batch_size);
        let tracker = Arc::new(ProgressTracker::new(plan.len() as u64, total));

        let writer = TargetWriter::new(
            Arc::clone(&collection),
            self.config.migration.identity_field.clone(),
        );
        let engine = TransferEngine::new(reader.clone(), writer);

        let cancelled = if plan.is_empty() {
            info!("No documents to migrate");
            false
        } else if self.config.migration.is_sequential() {
            info!(
                "Migrating {} batches sequentially (delay: {} ms)",
                plan.len(),
                self.config.migration.batch_delay_ms
            );
            self.run_sequential(&engine, &plan, &tracker, &cancel).await
        } else {
            info!(
                "Migrating {} batches with {} workers",
                plan.len(),
                self.config.migration.workers
            );
            self.run_pool(&engine, &plan, &tracker, &cancel).await
        };

        if cancelled {
            warn!("Migration cancelled, in-flight batches were allowed to finish");
        } else if cancel.is_cancelled() {
            info!("Cancellation requested after every batch was dispatched");
        }

        // Skipped once a stop was requested, even if every batch ran
        let verification = if self.config.migration.verify_after && !cancel.is_cancelled() {
            Some(self.verifier(reader, collection).verify().await)
        } else {
            None
        };

        let summary = tracker.finish(run_id, cancelled, verification);
        summary.log();
        Ok(summary)
    }

    /// Bounded pool: one spawned task per batch, at most `workers` at once.
    ///
    /// Returns whether dispatch stopped before the end of the plan.
    async fn run_pool(
        &self,
        engine: &TransferEngine,
        plan: &[BatchSpec],
        tracker: &Arc<ProgressTracker>,
        cancel: &CancellationToken,
    ) -> bool {
        let semaphore = Arc::new(Semaphore::new(self.config.migration.workers));
        let mut handles: Vec<(BatchSpec, JoinHandle<()>)> = Vec::with_capacity(plan.len());

        for batch in plan.iter().copied() {
            // Check for cancellation
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Cancellation requested, stopping new batches");
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(e) => {
                        error!("Worker pool closed unexpectedly: {}", e);
                        break;
                    }
                },
            };

            let engine = engine.clone();
            let tracker = Arc::clone(tracker);
            let handle = tokio::spawn(async move {
                let result = engine.execute(batch).await;
                tracker.record(&result);
                drop(permit);
            });
            handles.push((batch, handle));
        }

        let skipped = plan.len() - handles.len();
        tracker.skip_remaining(skipped as u64);

        for (batch, handle) in handles {
            if let Err(e) = handle.await {
                error!("{}: worker task panicked - {}", batch.label(), e);
                tracker.record(&BatchResult::failed(&batch));
            }
        }
        skipped > 0
    }

    /// One batch at a time with a fixed pause in between.
    ///
    /// Returns whether dispatch stopped before the end of the plan.
    async fn run_sequential(
        &self,
        engine: &TransferEngine,
        plan: &[BatchSpec],
        tracker: &Arc<ProgressTracker>,
        cancel: &CancellationToken,
    ) -> bool {
        let delay = self.config.migration.batch_delay();
        let mut dispatched = 0usize;

        for (i, batch) in plan.iter().copied().enumerate() {
            if cancel.is_cancelled() {
                info!("Cancellation requested, stopping new batches");
                break;
            }

            // Spawned so a panic stays contained to this batch.
            let worker = engine.clone();
            let handle = tokio::spawn(async move { worker.execute(batch).await });
            dispatched += 1;
            match handle.await {
                Ok(result) => {
                    tracker.record(&result);
                }
                Err(e) => {
                    error!("{}: worker task panicked - {}", batch.label(), e);
                    tracker.record(&BatchResult::failed(&batch));
                }
            }

            if i + 1 < plan.len() && !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        let skipped = plan.len() - dispatched;
        tracker.skip_remaining(skipped as u64);
        skipped > 0
    }

    fn verifier(&self, reader: SourceReader, collection: Arc<dyn TargetCollection>) -> Verifier {
        Verifier::new(
            reader,
            collection,
            self.config.migration.identity_field.clone(),
            self.config.migration.verify_fields.clone(),
        )
    }

    /// Compare source and target without migrating anything.
    ///
    /// Read-only: a missing target collection is reported, not created.
    pub async fn verify(&self) -> Result<VerificationReport> {
        let name = &self.config.target.collection;
        let reader = self.reader();
        match self.target.get_collection(name).await? {
            Some(collection) => Ok(self.verifier(reader, collection).verify().await),
            None => {
                error!("Target collection '{}' does not exist", name);
                let source_count = match reader.count().await {
                    Ok(n) => Some(n),
                    Err(e) => {
                        error!("Error counting source documents: {}", e);
                        None
                    }
                };
                error!("Migration verification FAILED");
                Ok(VerificationReport::target_missing(source_count))
            }
        }
    }

    /// Ping both stores.
    pub async fn health_check(&self) -> HealthCheckResult {
        let source = self.source.ping().await;
        let target = self.target.ping().await;
        HealthCheckResult {
            source_ok: source.is_ok(),
            target_ok: target.is_ok(),
            source_uri: mask_uri(&self.config.source.uri),
            target_endpoint: self.config.target.endpoint.clone(),
            source_error: source.err().map(|e| e.to_string()),
            target_error: target.err().map(|e| e.to_string()),
        }
    }

    /// Insert one document into the target and read it back by identity.
    pub async fn seed(&self, document: &Document) -> Result<SeedResult> {
        let identity_field = &self.config.migration.identity_field;
        let collection = self.prepare_target().await?;

        let mut document = document.clone();
        document.strip_identity();
        let identity = document.identity(identity_field);

        info!(
            "Inserting sample document ({})",
            document.identity_prefix(identity_field, 20)
        );
        let inserted_id = collection.insert_one(&document).await.map_err(|e| {
            error!("Failed to insert sample document: {}", e);
            MigrateError::DocumentWrite {
                identity: identity.clone().unwrap_or_default(),
                message: e.to_string(),
            }
        })?;
        info!("Sample document inserted with id {}", inserted_id);

        let found = match document.get(identity_field) {
            Some(value) => {
                let filter: Document = [(identity_field.clone(), value.clone())]
                    .into_iter()
                    .collect();
                collection.find_one(&filter).await?.is_some()
            }
            None => false,
        };
        if found {
            info!("Sample document found in target by {}", identity_field);
        } else {
            warn!("Sample document could not be read back by {}", identity_field);
        }

        Ok(SeedResult {
            inserted_id,
            identity,
            found,
        })
    }

    /// Release store resources.
    pub async fn close(&self) {
        self.source.close().await;
    }
}

/// Connect to each store independently and report which ones answer.
///
/// Unlike [`Orchestrator::new`], a failing store does not stop the check.
pub async fn health_check(config: &Config) -> HealthCheckResult {
    let source = match MongoSource::connect(&config.source).await {
        Ok(s) => {
            let ok = s.ping().await.map(|_| ());
            s.close().await;
            ok
        }
        Err(e) => Err(e),
    };
    let target = match DataApiTarget::connect(&config.target).await {
        Ok(t) => t.ping().await.map(|_| ()),
        Err(e) => Err(e),
    };

    HealthCheckResult {
        source_ok: source.is_ok(),
        target_ok: target.is_ok(),
        source_uri: mask_uri(&config.source.uri),
        target_endpoint: config.target.endpoint.clone(),
        source_error: source.err().map(|e| e.to_string()),
        target_error: target.err().map(|e| e.to_string()),
    }
}
