//! # Page Audit
//!
//! A post-deployment web page auditor. Every configured URL is loaded in a
//! headless Chrome once per device profile; the run records navigation
//! failures, console and runtime errors, failed network requests and missing
//! selectors, saves screenshots (split into parts for very tall pages), and
//! ends with a pass/fail report and exit status suitable for CI.
//!
//! ## Pipeline
//!
//! | Stage | Module | Output |
//! |-------|--------|--------|
//! | Config expansion | [`config`], [`expander`] | `Vec<PageJob>` in page then device order |
//! | Batch scheduling | [`scheduler`] | batches of `--concurrency` jobs, abort on critical failure |
//! | Page check | [`checker`], [`observers`] | one `PageResult` per job |
//! | Screenshot partitioning | [`capture`] | one or more PNG files per job |
//! | Aggregation | [`report`] | summary block and exit code |
//!
//! ## Configuration
//!
//! ```json
//! {
//!   "_default": { "devices": ["desktop", "mobile"], "maxScreenshotHeight": 8000 },
//!   "pages": {
//!     "https://example.com/": { "abortIfFail": true, "requiredSelectors": ["header"] },
//!     "https://example.com/blog": { "scrollPage": true, "waitFor": ["article"] }
//!   }
//! }
//! ```
//!
//! ## Library Use
//!
//! ```rust,no_run
//! use page_audit::{
//!     expand_jobs, AuditConfig, BatchScheduler, ChromeBrowser, PageChecker, RunSettings,
//!     RunSummary,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AuditConfig::load("audit.json".as_ref()).await?;
//!     let jobs = expand_jobs(&config)?;
//!
//!     let browser = Arc::new(ChromeBrowser::launch(&RunSettings::default()).await?);
//!     let checker = Arc::new(PageChecker::new(browser.clone(), "screenshots/manual"));
//!     let outcome = BatchScheduler::new(checker, 5).run(jobs).await?;
//!     browser.shutdown().await;
//!
//!     let summary = RunSummary::from_results(&outcome.results);
//!     println!("{} passed, {} failed", summary.passed, summary.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! page-audit run --config audit.json --output screenshots --concurrency 5
//! page-audit validate --config audit.json
//! ```
//!
//! ## Benchmarks
//!
//! ```bash
//! # Pure algorithms only (no Chrome required)
//! cargo bench
//!
//! # Chrome-backed smoke test
//! cargo test --features chrome-integration
//! ```

/// Audit file parsing, defaults and browser launch settings
pub mod config;

/// Error types
pub mod error;

/// Device profile table
pub mod devices;

/// Expansion of pages × devices into jobs
pub mod expander;

/// Console and network observers
pub mod observers;

/// Browser provider and page driver traits
pub mod browser;

/// Chrome implementation of the browser traits
pub mod chrome;

/// Screenshot capture and tall-page partitioning
pub mod capture;

/// Per-job page check state machine
pub mod checker;

/// Batch scheduler
pub mod scheduler;

/// Run summary and report
pub mod report;

/// Command-line interface
pub mod cli;

/// Run metrics
pub mod metrics;

/// Utility functions
pub mod utils;

#[cfg(test)]
mod testing;


pub use browser::*;
pub use capture::*;
pub use checker::*;
pub use chrome::*;
pub use cli::*;
pub use config::*;
pub use devices::*;
pub use error::*;
pub use expander::*;
pub use self::metrics::*;
pub use observers::*;
pub use report::*;
pub use scheduler::*;
pub use utils::*;
