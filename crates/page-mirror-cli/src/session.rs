//! One mirror session: launch, capture, settle, rewrite, tear down.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use page_mirror::{CaptureCoordinator, CaptureSummary, DocumentRewriter, MirrorRoot, RewriteReport};
use serde::Serialize;

use crate::config::MirrorConfig;
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::{NavigationResult, PageHandle, Renderer};
use crate::watchdog::Watchdog;

/// What a completed session produced.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub target_url: String,
    pub mirror_root: PathBuf,
    pub navigation: NavigationResult,
    /// Counts at teardown; captures still in flight may land afterwards.
    pub capture: CaptureSummary,
    /// `None` when the rewrite phase failed.
    pub rewrite: Option<RewriteReport>,
}

/// Resources opened during a run, released on every exit path.
#[derive(Default)]
struct Opened {
    page: Option<Box<dyn PageHandle>>,
    coordinator: Option<CaptureCoordinator>,
}

/// Drives a single page through the capture pipeline.
pub struct MirrorSession {
    config: MirrorConfig,
}

impl MirrorSession {
    pub fn new(config: MirrorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Run against a freshly launched Chromium.
    pub async fn run(&self) -> Result<SessionReport> {
        let root = MirrorRoot::open(&self.config.mirror_root)
            .context("failed to prepare mirror root")?;
        let renderer = ChromiumRenderer::launch(&self.config.browser_options()).await?;
        self.run_with(Arc::new(renderer), root).await
    }

    /// Run against any renderer. The renderer is always shut down before
    /// this returns, whatever the outcome.
    pub async fn run_with(
        &self,
        renderer: Arc<dyn Renderer>,
        root: MirrorRoot,
    ) -> Result<SessionReport> {
        let watchdog = Watchdog::arm(Arc::downgrade(&renderer), self.config.watchdog_timeout);
        let mut opened = Opened::default();

        let outcome = tokio::select! {
            result = self.drive(&*renderer, &root, &mut opened) => result,
            _ = watchdog.expired() => Err(anyhow!(
                "session did not finish within {}ms",
                watchdog.timeout().as_millis()
            )),
        };

        let capture = self.teardown(&*renderer, opened).await;
        watchdog.disarm();

        let (navigation, rewrite) = outcome?;
        Ok(SessionReport {
            target_url: self.config.target_url.to_string(),
            mirror_root: root.path().to_path_buf(),
            navigation,
            capture,
            rewrite,
        })
    }

    async fn drive(
        &self,
        renderer: &dyn Renderer,
        root: &MirrorRoot,
        opened: &mut Opened,
    ) -> Result<(NavigationResult, Option<RewriteReport>)> {
        let page = opened.page.insert(renderer.new_page().await?);
        opened.coordinator = Some(page.capture_responses(root.clone()).await?);

        let url = self.config.target_url.as_str();
        tracing::info!(url, "Loading page");
        let navigation = page
            .navigate(url, self.config.navigation_timeout)
            .await
            .with_context(|| format!("failed to load {url}"))?;
        tracing::info!(
            url = %navigation.final_url,
            load_time_ms = navigation.load_time_ms,
            "Page loaded"
        );

        tracing::info!(
            settle_ms = self.config.settle_delay.as_millis() as u64,
            "Waiting for scripts to settle"
        );
        tokio::time::sleep(self.config.settle_delay).await;

        let rewrite = match DocumentRewriter::new(root.clone()).run(page.document()).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(scope = ?e.scope(), "Failed to rewrite page: {e}");
                None
            }
        };
        Ok((navigation, rewrite))
    }

    async fn teardown(&self, renderer: &dyn Renderer, opened: Opened) -> CaptureSummary {
        if let Some(page) = opened.page {
            if let Err(e) = page.close().await {
                tracing::warn!("Failed to close page: {e:#}");
            }
        }
        if let Err(e) = renderer.shutdown().await {
            tracing::warn!("Failed to close browser: {e:#}");
        }

        let Some(coordinator) = opened.coordinator else {
            return CaptureSummary::default();
        };
        let summary = coordinator.summary();
        if summary.in_flight() > 0 {
            tracing::debug!(in_flight = summary.in_flight(), "Leaving captures to finish");
        }
        coordinator.detach();
        summary
    }
}
