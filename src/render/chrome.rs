//! Headless Chrome renderer.
//!
//! The browser session is blocking, so it runs on a `spawn_blocking` thread.
//! The page signals completion once, through the `window.digestRendered`
//! promise; we await that promise with a single `Runtime.evaluate` call and
//! bound the whole session with one timeout on the async side.

use super::ImageRenderer;
use super::template::{self, CAPTURE_SELECTOR};
use crate::error::RenderError;
use crate::models::DigestRecord;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Expression awaited in the page.
const COMPLETION_EXPR: &str = "window.digestRendered";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderConfig {
    /// Custom template path; the built-in template is used when `None`.
    pub template: Option<PathBuf>,
    /// Chrome binary; auto-detected when `None`.
    pub chrome_path: Option<PathBuf>,
    /// Deadline for the whole browser session.
    pub timeout: Duration,
    /// Browser window size. Must be large enough to hold the capture element.
    pub window_size: (u32, u32),
    pub sandbox: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            template: None,
            chrome_path: None,
            timeout: Duration::from_secs(30),
            window_size: (1200, 3000),
            sandbox: true,
        }
    }
}

#[derive(Debug)]
pub struct ChromeRenderer {
    template: String,
    config: RenderConfig,
}

impl ChromeRenderer {
    /// Load the template (custom or built-in) and validate it up front.
    pub fn new(config: RenderConfig) -> Result<Self, RenderError> {
        let template = match &config.template {
            Some(path) => {
                info!(path = %path.display(), "Loading custom render template");
                std::fs::read_to_string(path)?
            }
            None => template::BUILTIN_TEMPLATE.to_string(),
        };
        if !template.contains(template::DATA_PLACEHOLDER) {
            return Err(RenderError::Template(template::DATA_PLACEHOLDER));
        }
        Ok(Self { template, config })
    }
}

impl ImageRenderer for ChromeRenderer {
    #[instrument(level = "info", skip_all, fields(date = %record.date))]
    async fn render(&self, record: &DigestRecord) -> Result<Vec<u8>, RenderError> {
        let t0 = Instant::now();
        let html = template::fill(&self.template, record)?;
        let config = self.config.clone();
        let timeout = config.timeout;

        let session = tokio::task::spawn_blocking(move || capture(&html, &config));
        let png = match tokio::time::timeout(timeout, session).await {
            Err(_) => {
                warn!(?timeout, "Render timed out");
                return Err(RenderError::Timeout(timeout));
            }
            Ok(Err(join)) => return Err(RenderError::Aborted(join.to_string())),
            Ok(Ok(result)) => result?,
        };

        info!(
            bytes = png.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "Rendered digest image"
        );
        Ok(png)
    }
}

fn browser_err(e: impl std::fmt::Display) -> RenderError {
    RenderError::Browser(e.to_string())
}

/// One blocking browser session: load the page, await its completion
/// promise, screenshot the capture element.
fn capture(html: &str, config: &RenderConfig) -> Result<Vec<u8>, RenderError> {
    // Each browser call gets what is left of the one overall budget.
    let deadline = Instant::now() + config.timeout;

    let mut page = tempfile::Builder::new()
        .prefix("digest-")
        .suffix(".html")
        .tempfile()?;
    page.write_all(html.as_bytes())?;
    page.flush()?;
    let page_url = Url::from_file_path(page.path())
        .map_err(|_| browser_err(format!("not an absolute path: {}", page.path().display())))?;

    let options = LaunchOptions::default_builder()
        .headless(true)
        .sandbox(config.sandbox)
        .window_size(Some(config.window_size))
        .path(config.chrome_path.clone())
        .idle_browser_timeout(remaining(deadline, config.timeout)?)
        .build()
        .map_err(browser_err)?;
    let browser = Browser::new(options).map_err(browser_err)?;
    let tab = browser.new_tab().map_err(browser_err)?;

    tab.set_default_timeout(remaining(deadline, config.timeout)?);
    tab.navigate_to(page_url.as_str())
        .map_err(browser_err)?
        .wait_until_navigated()
        .map_err(browser_err)?;
    debug!(url = %page_url, "Page loaded; awaiting completion signal");

    tab.set_default_timeout(remaining(deadline, config.timeout)?);
    let outcome = tab.evaluate(COMPLETION_EXPR, true).map_err(browser_err)?;
    let signal = outcome
        .value
        .as_ref()
        .and_then(|v| v.as_str())
        .unwrap_or("error: page did not expose a completion signal");
    check_signal(signal)?;

    tab.set_default_timeout(remaining(deadline, config.timeout)?);
    let element = tab.wait_for_element(CAPTURE_SELECTOR).map_err(browser_err)?;
    element
        .capture_screenshot(CaptureScreenshotFormatOption::Png)
        .map_err(browser_err)
}

/// Time left until `deadline`; a timeout of the whole `budget` once spent.
fn remaining(deadline: Instant, budget: Duration) -> Result<Duration, RenderError> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|left| !left.is_zero())
        .ok_or(RenderError::Timeout(budget))
}

/// Interpret the value the page's completion promise settled with.
fn check_signal(signal: &str) -> Result<(), RenderError> {
    match signal {
        "ok" => Ok(()),
        other => Err(RenderError::Page(
            other.strip_prefix("error:").unwrap_or(other).trim().to_string(),
        )),
    }
}
