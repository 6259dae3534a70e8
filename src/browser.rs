//! Browser automation seams used by the page check engine
//!
//! `BrowserProvider` opens one isolated context per job; `PageDriver` is the
//! page inside it. The Chrome implementation lives in `chrome`; tests use
//! in-memory fakes.

use crate::{AuditError, DeviceProfile, ObserverSet, WaitUntil};
use async_trait::async_trait;
use std::time::Duration;

/// Opens isolated browsing contexts, one per page check
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserProvider: Send + Sync {
    /// Create a fresh context sized for `profile` and a blank page in it.
    ///
    /// The returned page already feeds `observers`, so nothing emitted during
    /// navigation is missed.
    async fn open_page(
        &self,
        profile: &DeviceProfile,
        observers: &ObserverSet,
    ) -> Result<Box<dyn PageDriver>, AuditError>;
}

/// One page in an isolated context
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate and wait for `wait_until`, bounded by `timeout`.
    ///
    /// Returns the main document's HTTP status, or `None` when no response
    /// could be attributed to the navigation.
    async fn navigate(
        &self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<Option<u16>, AuditError>;

    /// Wait until `selector` matches a visible element; `SelectorTimeout` on expiry
    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<(), AuditError>;

    async fn has_selector(&self, selector: &str) -> Result<bool, AuditError>;

    /// Scroll the document top to bottom in `step_px` increments, then back to the top
    async fn scroll_through(&self, step_px: u32, pause: Duration) -> Result<(), AuditError>;

    /// Full document height in CSS pixels
    async fn document_height(&self) -> Result<u32, AuditError>;

    /// PNG bytes of the viewport, or of the whole document when `full_page`
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, AuditError>;

    /// Release the page and its context
    async fn close(&self) -> Result<(), AuditError>;
}
