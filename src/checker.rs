//! The per-job page check
//!
//! `PageChecker::check` drives one `PageJob` through
//! `Init -> Navigating -> (NavigationFailed | Loaded) -> PostLoadChecks -> Capturing -> Done`
//! and always produces a `PageResult`. Problems found on the page are recorded
//! as findings; nothing a page does can fail the run.

use crate::{
    capture_screenshots, resolve_device, AuditError, BrowserProvider, ObserverSet, PageDriver,
    PageJob,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Fixed delays and limits applied to every page check
///
/// Tests shrink these to keep runs fast; production uses `Default`.
#[derive(Debug, Clone)]
pub struct CheckTimings {
    /// Pause after loading (and scrolling) so late scripts can fail visibly
    pub settle_delay: Duration,
    /// Upper bound for each `waitFor` selector
    pub wait_for_timeout: Duration,
    /// Navigation slower than this adds a warning
    pub slow_load_threshold: Duration,
    pub scroll_step_px: u32,
    pub scroll_pause: Duration,
}

impl Default for CheckTimings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(5),
            wait_for_timeout: Duration::from_secs(30),
            slow_load_threshold: Duration::from_secs(5),
            scroll_step_px: 400,
            scroll_pause: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Init,
    Navigating,
    NavigationFailed,
    Loaded,
    PostLoadChecks,
    Capturing,
    Done,
}

/// Outcome of one page job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageResult {
    pub url: String,
    pub device: String,
    /// Exactly `errors.is_empty()`
    pub success: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub duration: Duration,
    /// Files written for this job, in part order
    pub screenshots: Vec<String>,
}

impl PageResult {
    pub fn label(&self) -> String {
        format!("{} [{}]", self.url, self.device)
    }
}

#[derive(Debug, Default)]
struct Findings {
    errors: Vec<String>,
    warnings: Vec<String>,
    screenshots: Vec<String>,
}

pub struct PageChecker {
    provider: Arc<dyn BrowserProvider>,
    output_dir: PathBuf,
    timings: CheckTimings,
}

impl PageChecker {
    pub fn new(provider: Arc<dyn BrowserProvider>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            output_dir: output_dir.into(),
            timings: CheckTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: CheckTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Run the full check for one job. Never fails; every problem lands in the result.
    pub async fn check(&self, job: &PageJob) -> PageResult {
        let started = Instant::now();
        let mut findings = Findings::default();
        let label = job.label();

        transition(&label, CheckState::Init);
        let (profile, known) = resolve_device(&job.device);
        if !known {
            warn!("Unknown device '{}' for {}, using desktop", job.device, job.url);
        }

        let observers = ObserverSet::new();
        match self.provider.open_page(&profile, &observers).await {
            Ok(page) => {
                self.drive(job, page.as_ref(), &observers, &mut findings)
                    .await;
                if let Err(e) = page.close().await {
                    warn!("Failed to close page for {}: {}", label, e);
                }
            }
            Err(e) => findings.errors.push(e.finding()),
        }
        transition(&label, CheckState::Done);

        PageResult {
            url: job.url.clone(),
            device: job.device.clone(),
            success: findings.errors.is_empty(),
            errors: findings.errors,
            warnings: findings.warnings,
            duration: started.elapsed(),
            screenshots: findings.screenshots,
        }
    }

    async fn drive(
        &self,
        job: &PageJob,
        page: &dyn PageDriver,
        observers: &ObserverSet,
        findings: &mut Findings,
    ) {
        let label = job.label();

        transition(&label, CheckState::Navigating);
        let navigation_started = Instant::now();
        let timeout = Duration::from_millis(job.config.timeout_ms);
        let status = match page.navigate(&job.url, job.config.wait_until, timeout).await {
            Ok(status) => status,
            Err(e) => {
                transition(&label, CheckState::NavigationFailed);
                findings.errors.push(e.finding());
                return;
            }
        };
        let load_time = navigation_started.elapsed();

        if status != Some(200) {
            transition(&label, CheckState::NavigationFailed);
            let code = status.map_or_else(|| "unknown".to_string(), |s| s.to_string());
            findings.errors.push(format!("Status {code}"));
            return;
        }
        transition(&label, CheckState::Loaded);

        transition(&label, CheckState::PostLoadChecks);
        if let Err(e) = self
            .post_load_checks(job, page, observers, load_time, findings)
            .await
        {
            findings.errors.push(e.finding());
            return;
        }

        transition(&label, CheckState::Capturing);
        match capture_screenshots(page, job, &self.output_dir).await {
            Ok(artifacts) => findings
                .screenshots
                .extend(artifacts.into_iter().map(|a| a.filename)),
            Err(e) => {
                warn!("Screenshot failed for {}: {}", label, e);
                findings.errors.push(e.finding());
            }
        }
    }

    async fn post_load_checks(
        &self,
        job: &PageJob,
        page: &dyn PageDriver,
        observers: &ObserverSet,
        load_time: Duration,
        findings: &mut Findings,
    ) -> Result<(), AuditError> {
        let config = &job.config;

        for selector in &config.wait_for {
            match page
                .wait_for_visible(selector, self.timings.wait_for_timeout)
                .await
            {
                Ok(()) => {}
                Err(e @ AuditError::SelectorTimeout(..)) => findings.warnings.push(e.to_string()),
                Err(e) => findings
                    .warnings
                    .push(format!("Could not wait for {}: {}", selector, e.finding())),
            }
        }

        if config.scroll_page {
            page.scroll_through(self.timings.scroll_step_px, self.timings.scroll_pause)
                .await?;
        }

        if !self.timings.settle_delay.is_zero() {
            sleep(self.timings.settle_delay).await;
        }

        let console = observers.console.findings();
        if !console.is_empty() {
            findings
                .errors
                .push(format!("Console errors: {}", console.join("; ")));
        }

        let network = observers.network.findings();
        if !network.is_empty() {
            findings
                .errors
                .push(format!("Network errors: {}", network.join("; ")));
        }

        for selector in &config.required_selectors {
            if !page.has_selector(selector).await? {
                findings.errors.push(format!("Missing selector: {selector}"));
            }
        }

        if load_time > self.timings.slow_load_threshold {
            findings.warnings.push(format!(
                "Slow page load: {:.1}s",
                load_time.as_secs_f64()
            ));
        }

        Ok(())
    }
}

fn transition(label: &str, state: CheckState) {
    debug!("{} -> {:?}", label, state);
}
