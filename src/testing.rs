//! In-memory browser fakes shared by the unit and integration tests

use crate::{AuditError, BrowserProvider, DeviceProfile, ObserverSet, PageDriver, WaitUntil};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Raster width used for fake screenshots; kept small so tests stay fast
const FAKE_RASTER_WIDTH: u32 = 40;

/// How a fake page behaves once navigated to its URL
#[derive(Debug, Clone)]
pub struct PageScript {
    pub status: Option<u16>,
    pub navigation_error: Option<AuditError>,
    pub navigation_delay: Duration,
    pub visible_selectors: Vec<String>,
    pub present_selectors: Vec<String>,
    pub console_errors: Vec<String>,
    /// Console errors logged this long after navigation returns
    pub late_console_errors: Vec<(Duration, String)>,
    pub network_responses: Vec<(u16, String)>,
    pub failed_requests: Vec<String>,
    pub document_height: u32,
    pub viewport_height: u32,
    pub device_scale_factor: u32,
    pub screenshot_bytes: Option<Vec<u8>>,
    pub screenshot_error: Option<AuditError>,
    pub scroll_error: Option<AuditError>,
}

impl Default for PageScript {
    fn default() -> Self {
        Self {
            status: Some(200),
            navigation_error: None,
            navigation_delay: Duration::ZERO,
            visible_selectors: Vec::new(),
            present_selectors: Vec::new(),
            console_errors: Vec::new(),
            late_console_errors: Vec::new(),
            network_responses: Vec::new(),
            failed_requests: Vec::new(),
            document_height: 1_200,
            viewport_height: 800,
            device_scale_factor: 1,
            screenshot_bytes: None,
            screenshot_error: None,
            scroll_error: None,
        }
    }
}

impl PageScript {
    pub fn status(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let raster = image::RgbaImage::from_pixel(width, height, image::Rgba([250, 250, 250, 255]));
    let mut buffer = Vec::new();
    image::DynamicImage::ImageRgba8(raster)
        .write_to(
            &mut std::io::Cursor::new(&mut buffer),
            image::ImageOutputFormat::Png,
        )
        .unwrap();
    buffer
}

/// Fresh empty directory under the system temp dir
pub fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("page-audit-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[derive(Debug, Default)]
struct BrowserCounters {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
    navigations: Mutex<Vec<String>>,
}

/// A page whose behaviour is looked up by URL at navigation time
pub struct FakePage {
    scripts: Arc<HashMap<String, PageScript>>,
    current: Mutex<PageScript>,
    observers: ObserverSet,
    calls: Mutex<Vec<String>>,
    counters: Option<Arc<BrowserCounters>>,
}

impl FakePage {
    /// A standalone page that always follows `script`
    pub fn new(script: PageScript) -> Self {
        Self {
            scripts: Arc::new(HashMap::new()),
            current: Mutex::new(script),
            observers: ObserverSet::new(),
            calls: Mutex::new(Vec::new()),
            counters: None,
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn script(&self) -> PageScript {
        self.current.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn navigate(
        &self,
        url: &str,
        _wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<Option<u16>, AuditError> {
        self.record(format!("navigate {url}"));
        if let Some(counters) = &self.counters {
            counters.navigations.lock().unwrap().push(url.to_string());
        }
        if let Some(script) = self.scripts.get(url) {
            *self.current.lock().unwrap() = script.clone();
        }
        let script = self.script();

        if script.navigation_delay > timeout {
            tokio::time::sleep(timeout).await;
            return Err(AuditError::NavigationTimeout(timeout));
        }
        tokio::time::sleep(script.navigation_delay).await;

        for message in &script.console_errors {
            self.observers.console.record_error(message);
        }
        for (delay, message) in &script.late_console_errors {
            let console = self.observers.console.clone();
            let (delay, message) = (*delay, message.clone());
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                console.record_error(&message);
            });
        }
        for (status, resource) in &script.network_responses {
            self.observers.network.record_response(*status, resource);
        }
        for resource in &script.failed_requests {
            self.observers.network.record_request_failed(resource);
        }

        match script.navigation_error {
            Some(error) => Err(error),
            None => Ok(script.status),
        }
    }

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<(), AuditError> {
        self.record(format!("wait_for_visible {selector}"));
        if self.script().visible_selectors.iter().any(|s| s == selector) {
            Ok(())
        } else {
            Err(AuditError::SelectorTimeout(selector.to_string(), timeout))
        }
    }

    async fn has_selector(&self, selector: &str) -> Result<bool, AuditError> {
        self.record(format!("has_selector {selector}"));
        let script = self.script();
        Ok(script
            .present_selectors
            .iter()
            .chain(script.visible_selectors.iter())
            .any(|s| s == selector))
    }

    async fn scroll_through(&self, _step_px: u32, _pause: Duration) -> Result<(), AuditError> {
        self.record("scroll_through".to_string());
        match self.script().scroll_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn document_height(&self) -> Result<u32, AuditError> {
        self.record("document_height".to_string());
        Ok(self.script().document_height)
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, AuditError> {
        let script = self.script();
        self.record(if full_page {
            "screenshot(full)".to_string()
        } else {
            "screenshot(viewport)".to_string()
        });

        if let Some(error) = script.screenshot_error {
            return Err(error);
        }
        if let Some(bytes) = script.screenshot_bytes {
            return Ok(bytes);
        }
        let css_height = if full_page {
            script.document_height
        } else {
            script.viewport_height
        };
        Ok(png_bytes(
            FAKE_RASTER_WIDTH,
            css_height * script.device_scale_factor,
        ))
    }

    async fn close(&self) -> Result<(), AuditError> {
        self.record("close".to_string());
        if let Some(counters) = &self.counters {
            counters.in_flight.fetch_sub(1, Ordering::SeqCst);
            counters.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Hands out `FakePage`s scripted per URL and counts how they are used
#[derive(Clone, Default)]
pub struct FakeBrowser {
    scripts: Arc<HashMap<String, PageScript>>,
    counters: Arc<BrowserCounters>,
}

impl FakeBrowser {
    pub fn new(scripts: impl IntoIterator<Item = (String, PageScript)>) -> Self {
        Self {
            scripts: Arc::new(scripts.into_iter().collect()),
            counters: Arc::default(),
        }
    }

    /// Highest number of pages open at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// URLs in the order navigation started
    pub fn navigations(&self) -> Vec<String> {
        self.counters.navigations.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserProvider for FakeBrowser {
    async fn open_page(
        &self,
        _profile: &DeviceProfile,
        observers: &ObserverSet,
    ) -> Result<Box<dyn PageDriver>, AuditError> {
        let now_open = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(now_open, Ordering::SeqCst);
        self.counters.opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(FakePage {
            scripts: self.scripts.clone(),
            current: Mutex::new(PageScript::default()),
            observers: observers.clone(),
            calls: Mutex::new(Vec::new()),
            counters: Some(self.counters.clone()),
        }))
    }
}
