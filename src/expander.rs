//! Expansion of the audit file into a flat, ordered list of page jobs

use crate::{AuditConfig, AuditError, PageConfig, PartialPageConfig};
use std::collections::HashSet;

/// One (URL, device) unit of work with fully resolved settings
#[derive(Debug, Clone, PartialEq)]
pub struct PageJob {
    pub url: String,
    pub device: String,
    pub config: PageConfig,
}

impl PageJob {
    /// `url [device]`, the label used in logs and the report
    pub fn label(&self) -> String {
        format!("{} [{}]", self.url, self.device)
    }
}

/// Apply an override to a default, field by field; list fields are replaced, never merged
pub fn merge_config(default: &PageConfig, overrides: &PartialPageConfig) -> PageConfig {
    PageConfig {
        full_page: overrides.full_page.unwrap_or(default.full_page),
        devices: overrides
            .devices
            .clone()
            .unwrap_or_else(|| default.devices.clone()),
        timeout_ms: overrides.timeout_ms.unwrap_or(default.timeout_ms),
        required_selectors: overrides
            .required_selectors
            .clone()
            .unwrap_or_else(|| default.required_selectors.clone()),
        abort_if_fail: overrides.abort_if_fail.unwrap_or(default.abort_if_fail),
        wait_until: overrides.wait_until.unwrap_or(default.wait_until),
        wait_for: overrides
            .wait_for
            .clone()
            .unwrap_or_else(|| default.wait_for.clone()),
        scroll_page: overrides.scroll_page.unwrap_or(default.scroll_page),
        max_screenshot_height: overrides
            .max_screenshot_height
            .unwrap_or(default.max_screenshot_height),
    }
}

/// Expand pages × devices into jobs, in page order then device order
///
/// Devices form an ordered set: a repeated name within one page is expanded once.
pub fn expand_jobs(config: &AuditConfig) -> Result<Vec<PageJob>, AuditError> {
    if config.pages.is_empty() {
        return Err(AuditError::NoPagesConfigured);
    }

    let mut jobs = Vec::new();
    for (url, overrides) in &config.pages {
        let resolved = merge_config(&config.defaults, overrides);
        let mut seen = HashSet::new();

        for device in &resolved.devices {
            if !seen.insert(device.as_str()) {
                continue;
            }
            jobs.push(PageJob {
                url: url.clone(),
                device: device.clone(),
                config: resolved.clone(),
            });
        }
    }

    Ok(jobs)
}
