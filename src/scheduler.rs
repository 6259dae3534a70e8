//! Fixed-width batch scheduling of page jobs
//!
//! Jobs run in consecutive batches of `width`. Every job in a batch is started
//! at once and the batch is awaited as a whole; the next batch starts only
//! after the previous one has fully finished. A failed job flagged
//! `abortIfFail` prevents any later batch from starting, while the rest of
//! its own batch still completes and is reported.

use crate::{AuditError, AuditMetrics, PageChecker, PageJob, PageResult};
use futures::future::try_join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Results of a scheduled run, in job order
#[derive(Debug, Clone, Default)]
pub struct ScheduleOutcome {
    pub results: Vec<PageResult>,
    /// Label of the `abortIfFail` job that stopped the run, if any
    pub aborted_by: Option<String>,
    /// Jobs never started because of the abort
    pub skipped: usize,
}

impl ScheduleOutcome {
    pub fn aborted(&self) -> bool {
        self.aborted_by.is_some()
    }
}

pub struct BatchScheduler {
    checker: Arc<PageChecker>,
    width: usize,
    metrics: Option<Arc<AuditMetrics>>,
}

impl BatchScheduler {
    pub fn new(checker: Arc<PageChecker>, width: usize) -> Self {
        Self {
            checker,
            width: width.max(1),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<AuditMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run `jobs` batch by batch
    ///
    /// Only a panicked job task is an error; page problems are part of the results.
    pub async fn run(&self, jobs: Vec<PageJob>) -> Result<ScheduleOutcome, AuditError> {
        let total = jobs.len();
        let progress = ProgressTracker::new(total);
        let mut outcome = ScheduleOutcome {
            results: Vec::with_capacity(total),
            ..Default::default()
        };

        let mut remaining = jobs.into_iter().peekable();
        let mut batch_number = 0;

        while remaining.peek().is_some() {
            let batch: Vec<PageJob> = remaining.by_ref().take(self.width).collect();
            batch_number += 1;
            info!("Batch {}: checking {} page(s)", batch_number, batch.len());

            let handles: Vec<_> = batch
                .iter()
                .cloned()
                .map(|job| {
                    let checker = self.checker.clone();
                    tokio::spawn(async move { checker.check(&job).await })
                })
                .collect();

            let batch_results = try_join_all(handles).await.map_err(|e| {
                error!("Page check task failed in batch {}: {}", batch_number, e);
                AuditError::from(e)
            })?;

            if let Some(metrics) = &self.metrics {
                metrics.record_batch(batch.len());
            }

            for (job, result) in batch.iter().zip(batch_results) {
                progress.record_completion(result.success);
                log_result(&result);
                if let Some(metrics) = &self.metrics {
                    metrics.record_result(&result);
                }

                if !result.success && job.config.abort_if_fail && outcome.aborted_by.is_none() {
                    outcome.aborted_by = Some(job.label());
                }
                outcome.results.push(result);
            }

            info!("{}", progress.get_progress());

            if let Some(label) = &outcome.aborted_by {
                warn!("Critical page failed: {}; no further batches will run", label);
                break;
            }
        }

        outcome.skipped = total - outcome.results.len();
        if outcome.skipped > 0 {
            info!("{} job(s) left unstarted after the abort", outcome.skipped);
            if let Some(metrics) = &self.metrics {
                metrics.record_skipped(outcome.skipped);
            }
        }

        Ok(outcome)
    }
}

fn log_result(result: &PageResult) {
    let elapsed = crate::format_duration(result.duration);
    if !result.success {
        warn!("✗ {} ({}): {}", result.label(), elapsed, result.errors.join(" | "));
    } else if !result.warnings.is_empty() {
        info!("! {} ({}): {}", result.label(), elapsed, result.warnings.join(" | "));
    } else {
        info!("✓ {} ({})", result.label(), elapsed);
    }
}

/// Completion counters for a scheduled run
pub struct ProgressTracker {
    total: usize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_completion(&self, success: bool) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn get_progress(&self) -> ProgressInfo {
        let completed = self.completed.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);

        ProgressInfo {
            total: self.total,
            completed,
            failed,
            passed: completed - failed,
            elapsed: self.start_time.elapsed(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::Relaxed) >= self.total
    }
}

#[derive(Debug, Clone)]
pub struct ProgressInfo {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub passed: usize,
    pub elapsed: Duration,
}

impl ProgressInfo {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f64 * 100.0 / self.total as f64
        }
    }
}

impl std::fmt::Display for ProgressInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Progress: {}/{} ({:.1}%), {} passed, {} failed, {} elapsed",
            self.completed,
            self.total,
            self.percent(),
            self.passed,
            self.failed,
            crate::format_duration(self.elapsed)
        )
    }
}
