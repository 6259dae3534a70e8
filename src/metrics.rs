use crate::{AuditError, PageResult};
use ::metrics::{register_counter, register_histogram, Counter, Histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::{Path, PathBuf};
use tracing::info;

/// Run counters for one audit
///
/// Handles are registered against whatever recorder is installed when this is
/// created, so install `MetricsFile` first or every handle is a no-op.
pub struct AuditMetrics {
    pub jobs_checked: Counter,
    pub jobs_passed: Counter,
    pub jobs_failed: Counter,
    pub jobs_skipped: Counter,
    pub warnings: Counter,
    pub screenshot_files: Counter,
    pub batches: Counter,
    pub job_duration: Histogram,
    pub batch_size: Histogram,
}

impl AuditMetrics {
    pub fn new() -> Self {
        Self {
            jobs_checked: register_counter!("page_audit_jobs_checked_total"),
            jobs_passed: register_counter!("page_audit_jobs_passed_total"),
            jobs_failed: register_counter!("page_audit_jobs_failed_total"),
            jobs_skipped: register_counter!("page_audit_jobs_skipped_total"),
            warnings: register_counter!("page_audit_warnings_total"),
            screenshot_files: register_counter!("page_audit_screenshot_files_total"),
            batches: register_counter!("page_audit_batches_total"),
            job_duration: register_histogram!("page_audit_job_duration_seconds"),
            batch_size: register_histogram!("page_audit_batch_size"),
        }
    }

    pub fn record_result(&self, result: &PageResult) {
        self.jobs_checked.increment(1);
        if result.success {
            self.jobs_passed.increment(1);
        } else {
            self.jobs_failed.increment(1);
        }

        self.warnings.increment(result.warnings.len() as u64);
        self.screenshot_files
            .increment(result.screenshots.len() as u64);
        self.job_duration.record(result.duration.as_secs_f64());
    }

    pub fn record_batch(&self, size: usize) {
        self.batches.increment(1);
        self.batch_size.record(size as f64);
    }

    pub fn record_skipped(&self, count: usize) {
        self.jobs_skipped.increment(count as u64);
    }
}

impl Default for AuditMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Prometheus text exposition written to a file when the run ends
pub struct MetricsFile {
    handle: PrometheusHandle,
    path: PathBuf,
}

impl MetricsFile {
    /// Install the Prometheus recorder globally; only one install per process succeeds
    pub fn install(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| AuditError::Configuration(format!("metrics recorder: {e}")))?;

        Ok(Self::from_handle(handle, path))
    }

    pub fn from_handle(handle: PrometheusHandle, path: impl Into<PathBuf>) -> Self {
        Self {
            handle,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    pub async fn write(&self) -> Result<(), AuditError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, self.render()).await?;
        info!("Metrics written to {}", self.path.display());
        Ok(())
    }
}
