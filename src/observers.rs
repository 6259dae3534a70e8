//! Job-scoped console and network observers
//!
//! Each page check owns one `ObserverSet`. The browser provider feeds raw
//! events into it from the moment the page exists; the check state machine
//! only reads the accumulated findings after a successful navigation.

use std::sync::{Arc, Mutex};

/// Console and runtime messages that are known third-party noise
pub const IGNORED_CONSOLE_PATTERNS: &[&str] = &[
    "the server responded with a status of 401",
    "the server responded with a status of 403",
    "Content Security Policy",
    "Content-Security-Policy",
    "Refused to load the script",
    "Refused to frame",
    "ERR_BLOCKED_BY_CLIENT",
    "Third-party cookie will be blocked",
    "was preloaded using link preload but not used",
];

/// Request URL fragments of analytics, ad and CAPTCHA vendors whose failures are ignored
pub const IGNORED_NETWORK_DOMAINS: &[&str] = &[
    "google-analytics.com",
    "googletagmanager.com",
    "analytics.google.com",
    "doubleclick.net",
    "googlesyndication.com",
    "googleadservices.com",
    "facebook.com/tr",
    "connect.facebook.net",
    "hotjar.com",
    "clarity.ms",
    "segment.io",
    "mixpanel.com",
    "recaptcha",
    "hcaptcha.com",
    "challenges.cloudflare.com",
];

/// Append-only, thread-safe list of findings
#[derive(Debug, Clone, Default)]
pub struct FindingLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl FindingLog {
    pub fn push(&self, finding: String) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(finding);
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

/// Console errors and uncaught exceptions, minus the ignore list
#[derive(Debug, Clone, Default)]
pub struct ConsoleObserver {
    log: FindingLog,
}

impl ConsoleObserver {
    pub fn record_error(&self, message: &str) {
        if IGNORED_CONSOLE_PATTERNS
            .iter()
            .any(|pattern| message.contains(pattern))
        {
            return;
        }
        self.log.push(message.to_string());
    }

    pub fn findings(&self) -> Vec<String> {
        self.log.snapshot()
    }
}

/// HTTP error responses and transport failures, minus ignored vendor domains
#[derive(Debug, Clone, Default)]
pub struct NetworkObserver {
    log: FindingLog,
}

impl NetworkObserver {
    fn is_ignored(url: &str) -> bool {
        IGNORED_NETWORK_DOMAINS.iter().any(|domain| url.contains(domain))
    }

    pub fn record_response(&self, status: u16, url: &str) {
        if status < 400 || Self::is_ignored(url) {
            return;
        }
        self.log.push(format!("{status} {url}"));
    }

    pub fn record_request_failed(&self, url: &str) {
        if Self::is_ignored(url) {
            return;
        }
        self.log.push(format!("Failed: {url}"));
    }

    pub fn findings(&self) -> Vec<String> {
        self.log.snapshot()
    }
}

/// The observers attached to one page for the lifetime of its job
#[derive(Debug, Clone, Default)]
pub struct ObserverSet {
    pub console: ConsoleObserver,
    pub network: NetworkObserver,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }
}
