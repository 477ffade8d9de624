//! Renderer abstraction for the browser that loads the mirrored page.
//!
//! Defines the `Renderer` and `PageHandle` traits that abstract over the
//! browser engine (currently Chromium via chromiumoxide), so the session
//! driver can be exercised without a real browser.

pub mod chromium;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use page_mirror::{CaptureCoordinator, DocumentSource, MirrorRoot};
use serde::{Deserialize, Serialize};

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// A browser engine that can open pages.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Open a new page (tab).
    async fn new_page(&self) -> Result<Box<dyn PageHandle>>;
    /// Shut down the browser engine. Calling it again after the browser is
    /// gone is a no-op.
    async fn shutdown(&self) -> Result<()>;
}

/// A single open page.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Start capturing every finished response into `root`.
    ///
    /// Capture runs in the background, concurrently with navigation.
    async fn capture_responses(&self, root: MirrorRoot) -> Result<CaptureCoordinator>;
    /// Navigate to a URL, failing if it does not load within `timeout`.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<NavigationResult>;
    /// Whether the page is still open.
    fn is_open(&self) -> bool;
    /// The settled DOM, for the document rewriter.
    fn document(&self) -> &dyn DocumentSource;
    /// Close the page. Closing twice is a no-op.
    async fn close(&self) -> Result<()>;
}
