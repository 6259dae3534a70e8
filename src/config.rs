//! Configuration loading with serde deserialization
//!
//! This module holds the per-page check settings read from the audit file
//! (`_default` plus per-URL overrides) and the run-wide settings that control
//! the shared browser, concurrency and output location.

use crate::{validate_url, AuditError};
use indexmap::IndexMap;
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Headroom the browser's own command timeout keeps above the longest `timeoutMs`
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(10);

/// Readiness signal a navigation waits for before it counts as loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    /// The `load` event fired (default)
    #[default]
    Load,
    /// The `DOMContentLoaded` event fired
    DomContentLoaded,
    /// Load fired and no new request was issued for a quiet period
    NetworkIdle,
    /// The navigation response was received and the document committed
    Commit,
}

/// Upper bound on the height of a single screenshot artifact
///
/// Written as a positive integer, or as `null` for "no limit". The strings
/// `"none"`, `"no limit"` and `"unlimited"` are accepted as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeightLimit {
    /// Split full-page captures taller than this many CSS pixels
    Pixels(u32),
    /// Never split
    #[default]
    Unlimited,
}

impl HeightLimit {
    pub fn pixels(&self) -> Option<u32> {
        match self {
            HeightLimit::Pixels(px) => Some(*px),
            HeightLimit::Unlimited => None,
        }
    }
}

impl<'de> Deserialize<'de> for HeightLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HeightLimitVisitor;

        impl<'de> Visitor<'de> for HeightLimitVisitor {
            type Value = HeightLimit;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a positive pixel height or null for no limit")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<HeightLimit, E> {
                match u32::try_from(v) {
                    Ok(0) => Err(E::custom("maxScreenshotHeight must be greater than 0")),
                    Ok(px) => Ok(HeightLimit::Pixels(px)),
                    Err(_) => Err(E::custom("maxScreenshotHeight is too large")),
                }
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<HeightLimit, E> {
                if v <= 0 {
                    return Err(E::custom("maxScreenshotHeight must be greater than 0"));
                }
                self.visit_u64(v as u64)
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<HeightLimit, E> {
                if v.fract() != 0.0 || v <= 0.0 {
                    return Err(E::custom("maxScreenshotHeight must be a positive integer"));
                }
                self.visit_u64(v as u64)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<HeightLimit, E> {
                match v.trim().to_ascii_lowercase().as_str() {
                    "none" | "no limit" | "unlimited" => Ok(HeightLimit::Unlimited),
                    other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
                }
            }

            fn visit_unit<E: de::Error>(self) -> Result<HeightLimit, E> {
                Ok(HeightLimit::Unlimited)
            }

            fn visit_none<E: de::Error>(self) -> Result<HeightLimit, E> {
                Ok(HeightLimit::Unlimited)
            }
        }

        deserializer.deserialize_any(HeightLimitVisitor)
    }
}

/// Fully resolved settings for one page check
///
/// # Examples
///
/// ```rust
/// use page_audit::{HeightLimit, PageConfig};
///
/// let config = PageConfig {
///     devices: vec!["desktop".to_string()],
///     max_screenshot_height: HeightLimit::Pixels(4000),
///     ..Default::default()
/// };
/// assert!(config.full_page);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PageConfig {
    /// Capture the whole document instead of the viewport (default: true)
    pub full_page: bool,

    /// Device profiles to check the page on, in order (default: desktop, mobile)
    pub devices: Vec<String>,

    /// Navigation timeout in milliseconds (default: 30000)
    pub timeout_ms: u64,

    /// Selectors that must exist in the DOM for the page to pass
    pub required_selectors: Vec<String>,

    /// Stop launching further batches when this page fails (default: false)
    pub abort_if_fail: bool,

    /// Readiness signal to wait for during navigation (default: load)
    pub wait_until: WaitUntil,

    /// Selectors to wait for (visible) before checking; timeouts only warn
    pub wait_for: Vec<String>,

    /// Scroll the whole document before capture to trigger lazy content
    pub scroll_page: bool,

    /// Split full-page captures taller than this (default: no limit)
    pub max_screenshot_height: HeightLimit,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            full_page: true,
            devices: vec!["desktop".to_string(), "mobile".to_string()],
            timeout_ms: 30_000,
            required_selectors: Vec::new(),
            abort_if_fail: false,
            wait_until: WaitUntil::Load,
            wait_for: Vec::new(),
            scroll_page: false,
            max_screenshot_height: HeightLimit::Unlimited,
        }
    }
}

/// Per-page override; every present field replaces the default wholesale
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PartialPageConfig {
    pub full_page: Option<bool>,
    pub devices: Option<Vec<String>>,
    pub timeout_ms: Option<u64>,
    pub required_selectors: Option<Vec<String>>,
    pub abort_if_fail: Option<bool>,
    pub wait_until: Option<WaitUntil>,
    pub wait_for: Option<Vec<String>>,
    pub scroll_page: Option<bool>,
    /// An explicit `null` here means "no limit", an absent key keeps the default
    #[serde(default, deserialize_with = "present")]
    pub max_screenshot_height: Option<HeightLimit>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
struct RawAuditFile {
    #[serde(rename = "_default")]
    default: Option<PartialPageConfig>,
    pages: Option<IndexMap<String, PartialPageConfig>>,
}

/// The validated audit file: default settings plus ordered per-URL overrides
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub defaults: PageConfig,
    pub pages: IndexMap<String, PartialPageConfig>,
}

impl AuditConfig {
    pub async fn load(path: &Path) -> Result<Self, AuditError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            AuditError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, AuditError> {
        let raw: RawAuditFile = serde_json::from_str(content)
            .map_err(|e| AuditError::Configuration(format!("malformed config: {e}")))?;

        let default_override = raw
            .default
            .ok_or_else(|| AuditError::Configuration("missing `_default` object".to_string()))?;
        let pages = raw
            .pages
            .ok_or_else(|| AuditError::Configuration("missing `pages` mapping".to_string()))?;

        let defaults = crate::merge_config(&PageConfig::default(), &default_override);
        let config = Self { defaults, pages };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AuditError> {
        if self.pages.is_empty() {
            return Err(AuditError::NoPagesConfigured);
        }

        if self.defaults.timeout_ms == 0 {
            return Err(AuditError::Configuration(
                "`_default.timeoutMs` must be greater than 0".to_string(),
            ));
        }

        for (url, page) in &self.pages {
            validate_url(url).map_err(|_| AuditError::InvalidUrl(url.clone()))?;

            if page.timeout_ms == Some(0) {
                return Err(AuditError::Configuration(format!(
                    "`timeoutMs` for {url} must be greater than 0"
                )));
            }
        }

        Ok(())
    }

    /// Largest navigation timeout any page resolves to
    pub fn longest_timeout(&self) -> Duration {
        let longest = self
            .pages
            .values()
            .filter_map(|page| page.timeout_ms)
            .fold(self.defaults.timeout_ms, u64::max);
        Duration::from_millis(longest)
    }
}

/// Run-wide settings supplied on the command line
///
/// # Examples
///
/// ```rust
/// use page_audit::RunSettings;
///
/// let settings = RunSettings {
///     concurrency: 3,
///     ..Default::default()
/// };
/// assert!(settings.headless);
/// ```
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Number of page checks run together in one batch (default: 5)
    pub concurrency: usize,

    /// Directory that receives one timestamped folder per run (default: screenshots)
    pub output_root: PathBuf,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Run the browser without a window (default: true)
    pub headless: bool,

    /// User-Agent override applied to every non-mobile profile
    pub user_agent: Option<String>,

    /// Timeout for each browser command, navigation included (default: 40s)
    ///
    /// Must stay above every page's `timeoutMs`, which is the bound a check
    /// actually enforces. See [`RunSettings::fit_navigation_timeout`].
    pub request_timeout: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            output_root: PathBuf::from("screenshots"),
            chrome_path: None,
            headless: true,
            user_agent: None,
            request_timeout: Duration::from_millis(30_000) + REQUEST_TIMEOUT_MARGIN,
        }
    }
}

impl RunSettings {
    /// Raise the browser command timeout so `longest` page navigations can finish
    pub fn fit_navigation_timeout(mut self, longest: Duration) -> Self {
        self.request_timeout = self.request_timeout.max(longest + REQUEST_TIMEOUT_MARGIN);
        self
    }

    pub fn validate(&self) -> Result<(), AuditError> {
        if self.concurrency == 0 {
            return Err(AuditError::Configuration(
                "concurrency must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Generate Chrome command-line arguments for the shared audit browser
///
/// # Examples
///
/// ```rust
/// use page_audit::{get_chrome_args, RunSettings};
///
/// let args = get_chrome_args(&RunSettings::default());
/// assert!(args.contains(&"--headless".to_string()));
/// ```
pub fn get_chrome_args(settings: &RunSettings) -> Vec<String> {
    let unique_id = format!("{}-{}", std::process::id(), uuid::Uuid::new_v4());

    let mut args = vec![
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-features=TranslateUI".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--hide-scrollbars".to_string(),
        "--mute-audio".to_string(),
        format!("--user-data-dir=/tmp/page-audit-{unique_id}"),
    ];

    if settings.headless {
        args.insert(0, "--headless".to_string());
    }

    args
}

pub fn create_browser_config(
    settings: &RunSettings,
) -> Result<chromiumoxide::browser::BrowserConfig, AuditError> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .window_size(1920, 1080)
        .request_timeout(settings.request_timeout)
        .args(get_chrome_args(settings));

    if !settings.headless {
        builder = builder.with_head();
    }

    if let Some(chrome_path) = &settings.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(AuditError::BrowserLaunchFailed)
}
