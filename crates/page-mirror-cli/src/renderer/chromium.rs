//! Chromium-based renderer using chromiumoxide.

use super::{NavigationResult, PageHandle, Renderer};
use crate::network::NetworkPump;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{GetResponseBodyParams, RequestId};
use chromiumoxide::page::Page;
use futures::StreamExt;
use page_mirror::{
    CaptureCoordinator, CapturedResponse, DocumentSource, MirrorError, MirrorResult, MirrorRoot,
    ResponseSource,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Environment variable naming an explicit Chromium binary.
pub const CHROMIUM_PATH_ENV: &str = "PAGE_MIRROR_CHROMIUM_PATH";

/// Serializes the document the way a saved page should start: doctype first.
const SERIALIZE_DOCUMENT_JS: &str = r#"(() => {
    const doctype = document.doctype
        ? new XMLSerializer().serializeToString(document.doctype)
        : "";
    return doctype + document.documentElement.outerHTML;
})()"#;

/// Find the Chromium binary path.
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    // 1. Configured path
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.to_path_buf());
        }
    }

    // 2. PAGE_MIRROR_CHROMIUM_PATH env
    if let Ok(p) = std::env::var(CHROMIUM_PATH_ENV) {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 3. Per-user cache
    if let Some(cache) = dirs::cache_dir() {
        let base = cache.join("page-mirror/chromium");
        let candidates = if cfg!(target_os = "macos") {
            vec![
                base.join("chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                base.join("chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                base.join("chrome"),
            ]
        } else {
            vec![base.join("chrome-linux64/chrome"), base.join("chrome")]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 4. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 5. Common macOS locations
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// How to launch the browser.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
        }
    }
}

/// Chromium-based renderer.
///
/// The browser sits behind an `Option` so shutdown can run from either the
/// session or the watchdog, whichever gets there first.
pub struct ChromiumRenderer {
    browser: Mutex<Option<Browser>>,
    handler: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ChromiumRenderer {
    /// Launch a Chromium instance.
    pub async fn launch(options: &BrowserOptions) -> Result<Self> {
        let chrome_path = find_chromium(options.chrome_path.as_deref()).with_context(|| {
            format!("Chromium not found. Install Chrome/Chromium or set {CHROMIUM_PATH_ENV}.")
        })?;
        tracing::debug!(path = %chrome_path.display(), "Using Chromium");

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");
        builder = if options.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Spawn the handler task
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("Browser handler error: {e}");
                }
            }
        });

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            handler: std::sync::Mutex::new(Some(handler)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>> {
        let guard = self.browser.lock().await;
        let Some(browser) = guard.as_ref() else {
            bail!("browser already shut down");
        };
        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        Ok(Box::new(ChromiumPage {
            page,
            open: Arc::new(AtomicBool::new(true)),
            pump: Arc::new(std::sync::Mutex::new(None)),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let browser = self.browser.lock().await.take();
        let Some(mut browser) = browser else {
            tracing::debug!("Browser already closed");
            return Ok(());
        };

        tracing::info!("Closing browser");
        let closed = stop_process(&mut browser, PROCESS_EXIT_TIMEOUT).await;
        if let Some(handler) = self
            .handler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handler.abort();
        }
        closed?;
        tracing::info!("Browser closed");
        Ok(())
    }
}

/// How long a closed browser gets to exit before its process is killed.
const PROCESS_EXIT_TIMEOUT: Duration = Duration::from_secs(10);

/// The browser child process, as far as shutdown is concerned.
#[async_trait]
trait BrowserProcess: Send {
    async fn close(&mut self) -> Result<()>;
    async fn wait(&mut self) -> Result<()>;
    async fn kill(&mut self) -> Result<()>;
}

#[async_trait]
impl BrowserProcess for Browser {
    async fn close(&mut self) -> Result<()> {
        Browser::close(self)
            .await
            .map(|_| ())
            .context("failed to close browser")
    }

    async fn wait(&mut self) -> Result<()> {
        Browser::wait(self)
            .await
            .map(|_| ())
            .context("failed waiting for browser process")
    }

    async fn kill(&mut self) -> Result<()> {
        match Browser::kill(self).await {
            Some(result) => result.context("failed to kill browser process"),
            None => Ok(()),
        }
    }
}

/// Ask the browser to close, then make sure its process is gone.
///
/// A browser that rejects the close command is killed. One that accepted it
/// but has not exited within `grace` is killed too. Returns the close result.
async fn stop_process(process: &mut dyn BrowserProcess, grace: Duration) -> Result<()> {
    let closed = process.close().await;
    if let Err(e) = &closed {
        tracing::warn!("Browser did not close cleanly, killing it: {e:#}");
        if let Err(e) = process.kill().await {
            tracing::warn!("{e:#}");
        }
    }
    let waited = tokio::time::timeout(grace, process.wait()).await;
    match waited {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("{e:#}"),
        Err(_) => {
            tracing::warn!(
                grace_ms = grace.as_millis() as u64,
                "Browser process still running, killing it"
            );
            if let Err(e) = process.kill().await {
                tracing::warn!("{e:#}");
            }
        }
    }
    closed
}

/// A single Chromium page.
#[derive(Clone)]
pub struct ChromiumPage {
    page: Page,
    open: Arc<AtomicBool>,
    pump: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
}

#[async_trait]
impl PageHandle for ChromiumPage {
    async fn capture_responses(&self, root: MirrorRoot) -> Result<CaptureCoordinator> {
        let coordinator = CaptureCoordinator::new(root, Arc::new(self.clone()));
        let pump = NetworkPump::subscribe(&self.page).await?;
        let task = tokio::spawn(pump.run(coordinator.clone()));
        if let Some(previous) = self
            .pump
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(task)
        {
            previous.abort();
        }
        Ok(coordinator)
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<NavigationResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(timeout, self.page.goto(url)).await;

        match result {
            Ok(Ok(_)) => {
                // Wait for page to be loaded
                let _ = self.page.wait_for_navigation().await;
                let load_time_ms = start.elapsed().as_millis() as u64;

                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {}ms", timeout.as_millis()),
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn document(&self) -> &dyn DocumentSource {
        self
    }

    async fn close(&self) -> Result<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(pump) = self.pump.lock().unwrap_or_else(|e| e.into_inner()).take() {
            pump.abort();
        }
        self.page
            .clone()
            .close()
            .await
            .context("failed to close page")
    }
}

#[async_trait]
impl ResponseSource for ChromiumPage {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn fetch_body(&self, response: &CapturedResponse) -> MirrorResult<Vec<u8>> {
        let body_error = |reason: String| MirrorError::Body {
            url: response.url.clone(),
            reason,
        };
        let params = GetResponseBodyParams::new(RequestId::new(response.request_id.clone()));
        let returned = self
            .page
            .execute(params)
            .await
            .map_err(|e| body_error(e.to_string()))?;

        let body = &returned.result;
        if body.base64_encoded {
            base64::engine::general_purpose::STANDARD
                .decode(&body.body)
                .map_err(|e| body_error(format!("invalid base64 body: {e}")))
        } else {
            Ok(body.body.clone().into_bytes())
        }
    }
}

#[async_trait]
impl DocumentSource for ChromiumPage {
    async fn serialize_document(&self) -> MirrorResult<String> {
        let result = self
            .page
            .evaluate(SERIALIZE_DOCUMENT_JS)
            .await
            .map_err(|e| MirrorError::Document(format!("failed to get HTML: {e}")))?;

        result
            .into_value()
            .map_err(|e| MirrorError::Document(format!("failed to convert HTML result: {e:?}")))
    }

    async fn attribute_values(
        &self,
        selector: &str,
        attribute: &str,
    ) -> MirrorResult<Vec<String>> {
        let dom_error = |reason: String| MirrorError::Dom {
            query: selector.to_string(),
            reason,
        };
        let script = attribute_query_js(selector, attribute)
            .map_err(|e| dom_error(format!("failed to encode query: {e}")))?;
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| dom_error(e.to_string()))?;

        result
            .into_value()
            .map_err(|e| dom_error(format!("failed to convert result: {e:?}")))
    }
}

/// JS collecting one attribute from every element matching a selector.
fn attribute_query_js(selector: &str, attribute: &str) -> serde_json::Result<String> {
    Ok(format!(
        "Array.from(document.querySelectorAll({})).map(n => n.getAttribute({})).filter(v => v !== null)",
        serde_json::to_string(selector)?,
        serde_json::to_string(attribute)?,
    ))
}
