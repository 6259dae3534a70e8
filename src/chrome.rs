//! Chrome-backed browser provider
//!
//! A single headless Chrome is launched per run. Every page check gets its
//! own incognito browser context, which is disposed when the check closes
//! its page.

use crate::{
    create_browser_config, AuditError, BrowserProvider, DeviceProfile, ObserverSet, PageDriver,
    RunSettings, WaitUntil,
};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::log::{self, EventEntryAdded, LogEntryLevel};
use chromiumoxide::cdp::browser_protocol::network::{
    self, EventLoadingFailed, EventRequestWillBeSent, EventResponseReceived, LoaderId,
    ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EventDomContentEventFired, EventFrameNavigated, EventLoadEventFired,
    NavigateParams,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    self, ConsoleApiCalledType, EvaluateParams, EventConsoleApiCalled, EventExceptionThrown,
    RemoteObject,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::{Future, Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Quiet period after `load` that counts as network idle
const NETWORK_IDLE_QUIET: Duration = Duration::from_millis(500);

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long to keep looking for the main document response after navigation returns
const STATUS_GRACE: Duration = Duration::from_secs(1);

/// Chrome's navigation error for a 4xx/5xx main document served with an empty body
const HTTP_RESPONSE_CODE_FAILURE: &str = "net::ERR_HTTP_RESPONSE_CODE_FAILURE";

/// URL Chrome commits when it shows its own error page
const CHROME_ERROR_URL_PREFIX: &str = "chrome-error://";

/// Upper bound on scroll steps, for pages that keep growing while scrolled
const MAX_SCROLL_STEPS: u32 = 2000;

const DOCUMENT_HEIGHT_JS: &str = "Math.max(\
    document.body ? document.body.scrollHeight : 0, \
    document.body ? document.body.offsetHeight : 0, \
    document.documentElement.clientHeight, \
    document.documentElement.scrollHeight, \
    document.documentElement.offsetHeight)";

pub struct ChromeBrowser {
    browser: Arc<Mutex<Browser>>,
    handler: JoinHandle<Result<(), CdpError>>,
    user_agent: Option<String>,
}

impl ChromeBrowser {
    pub async fn launch(settings: &RunSettings) -> Result<Self, AuditError> {
        let config = create_browser_config(settings)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AuditError::BrowserLaunchFailed(e.to_string()))?;

        // The handler implements Stream and must be polled for the browser to make progress
        let handler_task = tokio::spawn(async move {
            loop {
                match handler.next().await {
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::error!("Handler error: {}", e);
                        return Err(e);
                    }
                    None => {
                        tracing::info!("Handler stream ended");
                        break;
                    }
                }
            }
            Ok(())
        });

        info!("Browser launched");

        Ok(Self {
            browser: Arc::new(Mutex::new(browser)),
            handler: handler_task,
            user_agent: settings.user_agent.clone(),
        })
    }

    pub async fn shutdown(&self) {
        info!("Shutting down browser...");
        if let Err(e) = self.browser.lock().await.close().await {
            warn!("Browser close failed: {}", e);
        }
        self.handler.abort();
    }

    async fn configure_page(
        &self,
        page: &Page,
        profile: &DeviceProfile,
        observers: &ObserverSet,
        documents: &DocumentResponses,
    ) -> Result<Vec<JoinHandle<()>>, AuditError> {
        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(profile.width)
            .height(profile.height)
            .device_scale_factor(profile.device_scale_factor)
            .mobile(profile.mobile)
            .build()
            .map_err(AuditError::Browser)?;
        page.execute(metrics).await.map_err(cdp_error)?;

        let user_agent = profile.user_agent.clone().or_else(|| self.user_agent.clone());
        if let Some(user_agent) = user_agent {
            page.execute(SetUserAgentOverrideParams::new(user_agent))
                .await
                .map_err(cdp_error)?;
        }

        page.execute(runtime::EnableParams::default())
            .await
            .map_err(cdp_error)?;
        page.execute(network::EnableParams::default())
            .await
            .map_err(cdp_error)?;
        page.execute(log::EnableParams::default())
            .await
            .map_err(cdp_error)?;

        let mut tasks = Vec::new();

        let mut console_events = page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(cdp_error)?;
        let console = observers.console.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = console_events.next().await {
                if event.r#type == ConsoleApiCalledType::Error {
                    console.record_error(&console_text(&event.args));
                }
            }
        }));

        let mut exceptions = page
            .event_listener::<EventExceptionThrown>()
            .await
            .map_err(cdp_error)?;
        let console = observers.console.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = exceptions.next().await {
                let details = &event.exception_details;
                let message = details
                    .exception
                    .as_ref()
                    .and_then(|e| e.description.as_deref())
                    .and_then(|d| d.lines().next())
                    .unwrap_or(details.text.as_str());
                console.record_error(message);
            }
        }));

        let mut log_entries = page
            .event_listener::<EventEntryAdded>()
            .await
            .map_err(cdp_error)?;
        let console = observers.console.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = log_entries.next().await {
                if event.entry.level == LogEntryLevel::Error {
                    console.record_error(&event.entry.text);
                }
            }
        }));

        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(cdp_error)?;
        let network = observers.network.clone();
        let documents = documents.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                let status = u16::try_from(event.response.status).unwrap_or(0);
                if event.r#type == ResourceType::Document {
                    documents.record(&event.loader_id, status).await;
                }
                network.record_response(status, &event.response.url);
            }
        }));

        let mut requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(cdp_error)?;
        let mut failures = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(cdp_error)?;
        let network = observers.network.clone();
        tasks.push(tokio::spawn(async move {
            let mut urls: HashMap<String, String> = HashMap::new();
            loop {
                tokio::select! {
                    biased;
                    Some(event) = requests.next() => {
                        urls.insert(event.request_id.inner().clone(), event.request.url.clone());
                    }
                    Some(event) = failures.next() => {
                        let url = urls
                            .get(event.request_id.inner())
                            .cloned()
                            .unwrap_or_else(|| event.request_id.inner().clone());
                        debug!("Request failed ({}): {}", event.error_text, url);
                        network.record_request_failed(&url);
                    }
                    else => break,
                }
            }
        }));

        Ok(tasks)
    }
}

#[async_trait]
impl BrowserProvider for ChromeBrowser {
    async fn open_page(
        &self,
        profile: &DeviceProfile,
        observers: &ObserverSet,
    ) -> Result<Box<dyn PageDriver>, AuditError> {
        if self.handler.is_finished() {
            return Err(AuditError::Browser("browser connection closed".to_string()));
        }

        let (context_id, page) = {
            let mut browser = self.browser.lock().await;
            let context_id = browser
                .create_browser_context(CreateBrowserContextParams::default())
                .await
                .map_err(cdp_error)?;

            let target = CreateTargetParams::builder()
                .url("about:blank")
                .browser_context_id(context_id.clone())
                .build()
                .map_err(AuditError::Browser)?;

            match browser.new_page(target).await {
                Ok(page) => (context_id, page),
                Err(e) => {
                    let _ = browser.dispose_browser_context(context_id).await;
                    return Err(cdp_error(e));
                }
            }
        };

        let documents = DocumentResponses::default();
        let tasks = match self
            .configure_page(&page, profile, observers, &documents)
            .await
        {
            Ok(tasks) => tasks,
            Err(e) => {
                let _ = page.close().await;
                let _ = self
                    .browser
                    .lock()
                    .await
                    .dispose_browser_context(context_id)
                    .await;
                return Err(e);
            }
        };

        Ok(Box::new(ChromePage {
            page,
            browser: self.browser.clone(),
            context_id,
            documents,
            tasks,
        }))
    }
}

/// Main-frame document responses seen on a page, keyed by loader id
#[derive(Clone, Default)]
struct DocumentResponses {
    inner: Arc<Mutex<Vec<(String, u16)>>>,
}

impl DocumentResponses {
    async fn record(&self, loader_id: &LoaderId, status: u16) {
        self.inner
            .lock()
            .await
            .push((loader_id.inner().clone(), status));
    }

    async fn status_for(&self, loader_id: Option<&LoaderId>) -> Option<u16> {
        let responses = self.inner.lock().await;
        match loader_id {
            Some(id) => responses
                .iter()
                .rev()
                .find(|(loader, _)| loader == id.inner())
                .map(|(_, status)| *status),
            None => responses.last().map(|(_, status)| *status),
        }
    }
}

pub struct ChromePage {
    page: Page,
    browser: Arc<Mutex<Browser>>,
    context_id: BrowserContextId,
    documents: DocumentResponses,
    tasks: Vec<JoinHandle<()>>,
}

impl ChromePage {
    async fn evaluate<T: DeserializeOwned>(&self, expression: String) -> Result<T, AuditError> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(AuditError::Browser)?;

        self.page
            .evaluate_expression(params)
            .await
            .map_err(cdp_error)?
            .into_value::<T>()
            .map_err(|e| AuditError::Browser(e.to_string()))
    }

    async fn main_document_status(&self, loader_id: Option<&LoaderId>) -> Option<u16> {
        let deadline = Instant::now() + STATUS_GRACE;
        loop {
            if let Some(status) = self.documents.status_for(loader_id).await {
                return Some(status);
            }
            if Instant::now() >= deadline {
                return None;
            }
            sleep(Duration::from_millis(50)).await;
        }
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn navigate(
        &self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<Option<u16>, AuditError> {
        // Subscribe before navigating so no readiness event is missed
        let mut dom_ready = self
            .page
            .event_listener::<EventDomContentEventFired>()
            .await
            .map_err(cdp_error)?;
        let mut loaded = self
            .page
            .event_listener::<EventLoadEventFired>()
            .await
            .map_err(cdp_error)?;
        let mut requests = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(cdp_error)?;
        let frames = self
            .page
            .event_listener::<EventFrameNavigated>()
            .await
            .map_err(cdp_error)?;

        let navigation = async {
            let command = self.page.execute(NavigateParams::new(url));
            let response = match wait_until {
                // Page.navigate only answers after load, so race it against the commit
                WaitUntil::Commit | WaitUntil::DomContentLoaded => {
                    match race_commit(command, main_frame_commits(frames)).await {
                        Readiness::Committed(loader_id) => {
                            if wait_until == WaitUntil::DomContentLoaded {
                                dom_ready.next().await;
                            }
                            return Ok(Some(loader_id));
                        }
                        Readiness::Responded(response) => response,
                    }
                }
                WaitUntil::Load | WaitUntil::NetworkIdle => command.await,
            }
            .map_err(|e| navigation_error(e, timeout))?;

            let loader_id = response.result.loader_id.clone();
            if let Some(error_text) = &response.result.error_text {
                if is_response_code_failure(error_text) {
                    // A response did commit; its status decides the result
                    debug!("{} returned an empty error document", url);
                    return Ok(loader_id);
                }
                return Err(AuditError::Navigation(error_text.clone()));
            }

            match wait_until {
                WaitUntil::Commit => {}
                WaitUntil::DomContentLoaded => {
                    dom_ready.next().await;
                }
                WaitUntil::Load => {
                    loaded.next().await;
                }
                WaitUntil::NetworkIdle => {
                    loaded.next().await;
                    wait_for_quiet(&mut requests, NETWORK_IDLE_QUIET).await;
                }
            }

            Ok::<_, AuditError>(loader_id)
        };

        let loader_id = tokio::time::timeout(timeout, navigation)
            .await
            .map_err(|_| AuditError::NavigationTimeout(timeout))??;

        Ok(self.main_document_status(loader_id.as_ref()).await)
    }

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<(), AuditError> {
        let selector_literal = serde_json::to_string(selector)?;
        let expression = format!(
            "(() => {{ const el = document.querySelector({selector_literal}); \
             if (!el) return false; \
             const style = window.getComputedStyle(el); \
             const rect = el.getBoundingClientRect(); \
             return style.visibility !== 'hidden' && rect.width > 0 && rect.height > 0; }})()"
        );

        let deadline = Instant::now() + timeout;
        loop {
            if self.evaluate::<bool>(expression.clone()).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AuditError::SelectorTimeout(selector.to_string(), timeout));
            }
            sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn has_selector(&self, selector: &str) -> Result<bool, AuditError> {
        let selector_literal = serde_json::to_string(selector)?;
        self.evaluate(format!(
            "document.querySelector({selector_literal}) !== null"
        ))
        .await
    }

    async fn scroll_through(&self, step_px: u32, pause: Duration) -> Result<(), AuditError> {
        let pause_ms = pause.as_millis();
        let expression = format!(
            "(async () => {{ \
               const height = () => {DOCUMENT_HEIGHT_JS}; \
               for (let y = 0, i = 0; y < height() && i < {MAX_SCROLL_STEPS}; y += {step_px}, i++) {{ \
                 window.scrollTo(0, y); \
                 await new Promise(r => setTimeout(r, {pause_ms})); \
               }} \
               window.scrollTo(0, 0); \
               return true; }})()"
        );
        self.evaluate::<bool>(expression).await.map(|_| ())
    }

    async fn document_height(&self) -> Result<u32, AuditError> {
        let height: f64 = self.evaluate(DOCUMENT_HEIGHT_JS.to_string()).await?;
        Ok(height.max(0.0).ceil() as u32)
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, AuditError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(full_page)
            .build();

        self.page
            .screenshot(params)
            .await
            .map_err(|e| AuditError::Capture(e.to_string()))
    }

    async fn close(&self) -> Result<(), AuditError> {
        for task in &self.tasks {
            task.abort();
        }

        let page_result = self.page.clone().close().await.map_err(cdp_error);
        let context_result = self
            .browser
            .lock()
            .await
            .dispose_browser_context(self.context_id.clone())
            .await
            .map(|_| ())
            .map_err(cdp_error);

        page_result.and(context_result)
    }
}

/// First of a navigation command's reply or the main frame committing
enum Readiness<R> {
    Committed(LoaderId),
    Responded(R),
}

async fn race_commit<F, S>(command: F, commits: S) -> Readiness<F::Output>
where
    F: Future,
    S: Stream<Item = LoaderId>,
{
    tokio::pin!(command);
    tokio::pin!(commits);
    tokio::select! {
        response = &mut command => Readiness::Responded(response),
        Some(loader_id) = commits.next() => Readiness::Committed(loader_id),
    }
}

/// Loader ids of top-level commits, skipping Chrome's own error pages
fn main_frame_commits<S>(frames: S) -> impl Stream<Item = LoaderId>
where
    S: Stream<Item = Arc<EventFrameNavigated>>,
{
    frames.filter_map(|event| {
        let frame = &event.frame;
        let committed =
            frame.parent_id.is_none() && !frame.url.starts_with(CHROME_ERROR_URL_PREFIX);
        futures::future::ready(committed.then(|| frame.loader_id.clone()))
    })
}

fn is_response_code_failure(error_text: &str) -> bool {
    error_text == HTTP_RESPONSE_CODE_FAILURE
}

fn navigation_error(err: CdpError, timeout: Duration) -> AuditError {
    match err {
        CdpError::Timeout => AuditError::NavigationTimeout(timeout),
        other => AuditError::Navigation(other.to_string()),
    }
}

/// Resolve once no new request has been issued for `quiet`
async fn wait_for_quiet<S>(requests: &mut S, quiet: Duration)
where
    S: Stream + Unpin,
{
    loop {
        match tokio::time::timeout(quiet, requests.next()).await {
            Err(_) => return,
            Ok(Some(_)) => continue,
            Ok(None) => return,
        }
    }
}

fn console_text(args: &[RemoteObject]) -> String {
    args.iter()
        .filter_map(|arg| match (&arg.value, &arg.description) {
            (Some(serde_json::Value::String(text)), _) => Some(text.clone()),
            (Some(value), _) => Some(value.to_string()),
            (None, Some(description)) => Some(description.clone()),
            (None, None) => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn cdp_error(err: CdpError) -> AuditError {
    AuditError::Browser(err.to_string())
}
