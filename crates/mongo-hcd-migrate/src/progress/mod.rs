//! Shared progress tracking and the final run summary.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::transfer::BatchResult;
use crate::verify::VerificationReport;

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedWithErrors,
    Cancelled,
}

impl RunStatus {
    pub fn from_outcome(cancelled: bool, total_errors: u64) -> Self {
        if cancelled {
            RunStatus::Cancelled
        } else if total_errors > 0 {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Completed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithErrors => "completed_with_errors",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// Consistent copy of the tracker's counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub total_batches: u64,
    pub completed_batches: u64,
    pub skipped_batches: u64,
    pub total_migrated: u64,
    pub total_errors: u64,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Percentage of planned batches completed. A zero-batch plan is 100%.
    pub fn percent(&self) -> f64 {
        if self.total_batches == 0 {
            100.0
        } else {
            self.completed_batches as f64 / self.total_batches as f64 * 100.0
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    completed_batches: u64,
    skipped_batches: u64,
    total_migrated: u64,
    total_errors: u64,
}

/// Aggregates batch results from concurrent workers.
///
/// Every update and its progress line happen under one lock, so totals are
/// never torn and progress lines come out in completion order.
pub struct ProgressTracker {
    total_batches: u64,
    total_documents: u64,
    started: Instant,
    started_at: DateTime<Utc>,
    counters: Mutex<Counters>,
}

impl ProgressTracker {
    pub fn new(total_batches: u64, total_documents: u64) -> Self {
        Self {
            total_batches,
            total_documents,
            started: Instant::now(),
            started_at: Utc::now(),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Fold one batch result into the running totals and log progress.
    pub fn record(&self, result: &BatchResult) -> ProgressSnapshot {
        let mut counters = self.counters.lock();
        counters.completed_batches += 1;
        counters.total_migrated += result.migrated;
        counters.total_errors += result.errors;

        let snapshot = self.snapshot_of(&counters);
        info!(
            "Progress: {:.1}% ({}/{} batches completed)",
            snapshot.percent(),
            snapshot.completed_batches,
            snapshot.total_batches
        );
        info!(
            "   Migrated: {}, Errors: {}",
            snapshot.total_migrated, snapshot.total_errors
        );
        snapshot
    }

    /// Count batches that were planned but never dispatched.
    pub fn skip_remaining(&self, batches: u64) {
        if batches == 0 {
            return;
        }
        self.counters.lock().skipped_batches += batches;
        info!("{} batches skipped", batches);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let counters = self.counters.lock();
        self.snapshot_of(&counters)
    }

    pub fn percent(&self) -> f64 {
        self.snapshot().percent()
    }

    fn snapshot_of(&self, counters: &Counters) -> ProgressSnapshot {
        ProgressSnapshot {
            total_batches: self.total_batches,
            completed_batches: counters.completed_batches,
            skipped_batches: counters.skipped_batches,
            total_migrated: counters.total_migrated,
            total_errors: counters.total_errors,
            elapsed: self.started.elapsed(),
        }
    }

    /// Close the run and build its summary.
    pub fn finish(
        &self,
        run_id: impl Into<String>,
        cancelled: bool,
        verification: Option<VerificationReport>,
    ) -> MigrationSummary {
        let snapshot = self.snapshot();
        let duration = snapshot.elapsed;
        MigrationSummary {
            run_id: run_id.into(),
            status: RunStatus::from_outcome(cancelled, snapshot.total_errors),
            started_at: self.started_at,
            completed_at: Utc::now(),
            total_documents: self.total_documents,
            batches_planned: snapshot.total_batches,
            batches_completed: snapshot.completed_batches,
            batches_skipped: snapshot.skipped_batches,
            total_migrated: snapshot.total_migrated,
            total_errors: snapshot.total_errors,
            duration_seconds: duration.as_secs_f64(),
            throughput: throughput(snapshot.total_migrated, duration),
            verification,
        }
    }
}

/// Documents per second, or `None` when the run took under a millisecond.
pub fn throughput(migrated: u64, elapsed: Duration) -> Option<f64> {
    if elapsed < Duration::from_millis(1) {
        None
    } else {
        Some(migrated as f64 / elapsed.as_secs_f64())
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSummary {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: RunStatus,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Documents planned for this run.
    pub total_documents: u64,

    pub batches_planned: u64,
    pub batches_completed: u64,
    pub batches_skipped: u64,

    /// Documents written to the target.
    pub total_migrated: u64,

    /// Documents dropped for any reason.
    pub total_errors: u64,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Documents per second (absent for sub-millisecond runs).
    pub throughput: Option<f64>,

    /// Post-migration verification, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationReport>,
}

impl MigrationSummary {
    /// True when nothing was dropped, the run was not cancelled and any
    /// verification passed.
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
            && self.verification.as_ref().map_or(true, |v| v.passed())
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Log the closing summary block.
    pub fn log(&self) {
        let throughput = self
            .throughput
            .map(|t| format!("{:.2} docs/sec", t))
            .unwrap_or_else(|| "n/a".to_string());

        info!("Migration {} ({})", self.status.as_str(), self.run_id);
        info!("   Total documents processed: {}", self.total_documents);
        info!("   Documents migrated: {}", self.total_migrated);
        info!("   Errors: {}", self.total_errors);
        info!(
            "   Batches: {}/{} completed, {} skipped",
            self.batches_completed, self.batches_planned, self.batches_skipped
        );
        info!("   Duration: {:.2} seconds", self.duration_seconds);
        info!("   Throughput: {}", throughput);
    }
}
