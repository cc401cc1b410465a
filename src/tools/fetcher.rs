//! Headless-browser page fetcher.
//!
//! Each call launches its own Chromium process with a throwaway profile,
//! loads one URL, captures the rendered markup and tears the browser down
//! again, whatever the outcome. Nothing is pooled between calls.
//!
//! Browser access goes through [`BrowserLauncher`] / [`RenderSession`] so the
//! fetch policy (validation, timeout, teardown) is independent of CDP.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::error::CdpError;
use futures::StreamExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use thiserror::Error;
use tokio::task::JoinHandle;

use super::{Tool, ToolError};

/// Poll interval while waiting for the document to finish parsing.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A rendering failure with the kind of failure preserved.
#[derive(Debug, Error)]
#[error("{kind} - {message}")]
pub struct RenderError {
    pub kind: String,
    pub message: String,
}

impl RenderError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Whether the browser itself gave up waiting.
    pub fn is_timeout(&self) -> bool {
        self.kind == "Timeout"
    }
}

impl From<CdpError> for RenderError {
    fn from(e: CdpError) -> Self {
        RenderError::new(variant_name(&format!("{:?}", e)), e.to_string())
    }
}

impl From<std::io::Error> for RenderError {
    fn from(e: std::io::Error) -> Self {
        RenderError::new(format!("Io({:?})", e.kind()), e.to_string())
    }
}

/// Leading identifier of a `Debug` rendering, e.g. `LaunchExit` from `LaunchExit(..)`.
fn variant_name(debug: &str) -> String {
    let name: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        "Error".to_string()
    } else {
        name
    }
}

/// Starts isolated rendering sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn RenderSession>, RenderError>;
}

/// One short-lived browser.
#[async_trait]
pub trait RenderSession: Send {
    /// Load `url` and return the rendered document markup.
    async fn render(&mut self, url: &str) -> Result<String, RenderError>;

    /// Release every resource held by the session. Must be idempotent.
    async fn close(&mut self);
}

// ============================================================================
// Chromium (CDP) implementation
// ============================================================================

/// Launches a fresh headless Chromium per session.
pub struct ChromiumLauncher {
    chrome_path: Option<PathBuf>,
}

impl ChromiumLauncher {
    pub fn new(chrome_path: Option<PathBuf>) -> Self {
        Self { chrome_path }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn RenderSession>, RenderError> {
        let profile = tempfile::Builder::new()
            .prefix("research-assistant-profile-")
            .tempdir()?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile.path())
            .arg("--disable-gpu")
            .arg("--disable-extensions");
        if let Some(path) = &self.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| RenderError::new("LaunchConfig", e))?;

        let (browser, mut handler) = Browser::launch(config).await?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("Browser event error: {}", e);
                }
            }
        });

        tracing::debug!("Launched headless browser (profile {})", profile.path().display());

        Ok(Box::new(ChromiumSession {
            browser: Some(browser),
            handler_task,
            _profile: profile,
        }))
    }
}

/// Browser process, its CDP event pump, and the profile directory it owns.
struct ChromiumSession {
    browser: Option<Browser>,
    handler_task: JoinHandle<()>,
    _profile: TempDir,
}

#[async_trait]
impl RenderSession for ChromiumSession {
    async fn render(&mut self, url: &str) -> Result<String, RenderError> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| RenderError::new("SessionClosed", "browser already closed"))?;

        let page = browser.new_page("about:blank").await?;

        let navigation = page.execute(NavigateParams::new(url)).await?;
        if let Some(error_text) = &navigation.result.error_text {
            return Err(RenderError::new("NavigationFailed", error_text.clone()));
        }

        // Wait for DOMContentLoaded only; subresources may still be loading.
        loop {
            let ready: bool = page
                .evaluate("document.URL !== 'about:blank' && document.readyState !== 'loading'")
                .await?
                .into_value()
                .map_err(|e| RenderError::new("Evaluation", e.to_string()))?;
            if ready {
                break;
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }

        Ok(page.content().await?)
    }

    async fn close(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                tracing::warn!("Graceful browser close failed, killing process: {}", e);
                let _ = browser.kill().await;
            }
            if let Err(e) = browser.wait().await {
                tracing::debug!("Waiting for browser exit failed: {}", e);
            }
        }
        self.handler_task.abort();
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if self.browser.is_some() {
            tracing::warn!("Browser session dropped without close");
        }
        self.handler_task.abort();
    }
}

// ============================================================================
// Page fetcher tool
// ============================================================================

/// Returns true for strings the fetcher will attempt to load.
pub fn is_fetchable_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Fetch the rendered HTML of a page through a headless browser.
pub struct PageFetcher {
    launcher: Arc<dyn BrowserLauncher>,
    timeout: Duration,
}

impl PageFetcher {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, timeout: Duration) -> Self {
        Self { launcher, timeout }
    }

    /// Load `url` once and return its rendered markup.
    ///
    /// The session is closed on every path out of this function, including
    /// timeouts and render failures.
    pub async fn fetch(&self, url: &str) -> Result<String, ToolError> {
        if !is_fetchable_url(url) {
            return Err(invalid_url());
        }

        tracing::info!("[fetch_page] Attempting to fetch: {}", url);

        let mut session = self
            .launcher
            .launch()
            .await
            .map_err(|e| unexpected(url, e))?;

        let outcome = tokio::time::timeout(self.timeout, session.render(url)).await;
        session.close().await;

        match outcome {
            Err(_) => Err(timeout(url)),
            Ok(Err(e)) if e.is_timeout() => Err(timeout(url)),
            Ok(Err(e)) => Err(unexpected(url, e)),
            Ok(Ok(html)) if html.is_empty() => {
                let message = format!("Unknown error fetching URL: {}", url);
                tracing::error!("[fetch_page] {}", message);
                Err(ToolError::Unexpected {
                    kind: "EmptyContent".to_string(),
                    message,
                })
            }
            Ok(Ok(html)) => {
                tracing::info!(
                    "[fetch_page] Successfully fetched content (Length: {})",
                    html.len()
                );
                Ok(html)
            }
        }
    }
}

fn invalid_url() -> ToolError {
    ToolError::InvalidInput(
        "URL must be a string starting with http:// or https://".to_string(),
    )
}

fn timeout(url: &str) -> ToolError {
    let message = format!("Timeout occurred while loading URL: {}", url);
    tracing::error!("[fetch_page] {}", message);
    ToolError::Timeout(message)
}

fn unexpected(url: &str, e: RenderError) -> ToolError {
    let message = format!(
        "Failed to fetch URL '{}' using headless browser: {} - {}",
        url, e.kind, e.message
    );
    tracing::error!("[fetch_page] {}", message);
    ToolError::Unexpected {
        kind: e.kind,
        message,
    }
}

#[async_trait]
impl Tool for PageFetcher {
    fn name(&self) -> &str {
        "fetch_page"
    }

    fn description(&self) -> &str {
        "Fetch the full HTML of a web page using a headless browser, so JavaScript-rendered content is included. Returns the HTML on success, or a message starting with 'Error:' if the URL is invalid, loading times out, or the browser fails."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The complete URL (must start with http:// or https://) of the page to fetch"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let url = args.get("url").and_then(Value::as_str).ok_or_else(invalid_url)?;
        self.fetch(url).await
    }
}
