//! Capture coordination: one task per network response.
//!
//! Tasks are not serialized against each other. Two responses resolving to
//! the same file race, and whichever write completes last is what stays on
//! disk.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::task::JoinSet;

use crate::classify::should_ignore;
use crate::error::MirrorResult;
use crate::root::MirrorRoot;
use crate::types::{CaptureOutcome, CaptureSummary, CapturedResponse};
use crate::writer::{write_fetched, write_inline_image, Placement};

/// The browser page as seen by the capture pipeline.
#[async_trait]
pub trait ResponseSource: Send + Sync {
    /// Whether the owning page is still open.
    fn is_open(&self) -> bool;
    /// Read the full body of a finished response.
    async fn fetch_body(&self, response: &CapturedResponse) -> MirrorResult<Vec<u8>>;
}

#[derive(Default)]
struct Counters {
    dispatched: AtomicUsize,
    written: AtomicUsize,
    ignored: AtomicUsize,
    not_a_file: AtomicUsize,
    page_closed: AtomicUsize,
    failed: AtomicUsize,
}

impl Counters {
    fn record(&self, outcome: &CaptureOutcome) {
        let counter = match outcome {
            CaptureOutcome::Written { .. } => &self.written,
            CaptureOutcome::Ignored { .. } => &self.ignored,
            CaptureOutcome::NotAFile { .. } => &self.not_a_file,
            CaptureOutcome::PageClosed { .. } => &self.page_closed,
            CaptureOutcome::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CaptureSummary {
        CaptureSummary {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            not_a_file: self.not_a_file.load(Ordering::Relaxed),
            page_closed: self.page_closed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

struct Inner {
    root: MirrorRoot,
    source: Arc<dyn ResponseSource>,
    counters: Counters,
}

/// Routes each response through classify, resolve and write.
///
/// Cheap to clone; clones share the task set and counters.
#[derive(Clone)]
pub struct CaptureCoordinator {
    inner: Arc<Inner>,
    tasks: Arc<Mutex<JoinSet<CaptureOutcome>>>,
}

impl CaptureCoordinator {
    pub fn new(root: MirrorRoot, source: Arc<dyn ResponseSource>) -> Self {
        Self {
            inner: Arc::new(Inner {
                root,
                source,
                counters: Counters::default(),
            }),
            tasks: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    pub fn root(&self) -> &MirrorRoot {
        &self.inner.root
    }

    /// Spawn a capture task for one response. Must be called inside a tokio
    /// runtime.
    pub fn dispatch(&self, response: CapturedResponse) {
        self.inner.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        // Reap finished tasks so the set does not grow with the page.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move { inner.capture(response).await });
    }

    /// Capture one response on the current task.
    pub async fn capture(&self, response: CapturedResponse) -> CaptureOutcome {
        self.inner.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        self.inner.capture(response).await
    }

    /// Wait for every task dispatched so far and return their outcomes.
    ///
    /// Tasks reaped by an earlier `dispatch` are only visible in the summary.
    pub async fn drain(&self) -> Vec<CaptureOutcome> {
        let mut tasks = {
            let mut guard = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!("Capture task panicked: {e}"),
            }
        }
        outcomes
    }

    /// Let in-flight tasks finish on their own without waiting for them.
    pub fn detach(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.detach_all();
    }

    pub fn summary(&self) -> CaptureSummary {
        self.inner.counters.snapshot()
    }
}

impl Inner {
    async fn capture(&self, response: CapturedResponse) -> CaptureOutcome {
        let outcome = self.run(response).await;
        match &outcome {
            CaptureOutcome::Failed { error, .. } => {
                tracing::warn!(
                    url = %outcome.url(),
                    scope = ?error.scope(),
                    "Failed to capture resource: {error}"
                );
            }
            CaptureOutcome::PageClosed { .. } => {
                tracing::debug!(url = %outcome.url(), "Page closed before capture");
            }
            _ => {}
        }
        self.counters.record(&outcome);
        outcome
    }

    async fn run(&self, response: CapturedResponse) -> CaptureOutcome {
        let url = &response.url;
        if let Some(reason) = should_ignore(&response) {
            return CaptureOutcome::Ignored {
                url: url.clone(),
                reason,
            };
        }
        if !self.source.is_open() {
            return CaptureOutcome::PageClosed { url: url.clone() };
        }

        if response.is_inline_image() {
            return match write_inline_image(&self.root, url).await {
                Ok(path) => CaptureOutcome::Written {
                    url: url.clone(),
                    path,
                },
                Err(error) => CaptureOutcome::Failed {
                    url: url.clone(),
                    error,
                },
            };
        }

        let written = async {
            let body = self.source.fetch_body(&response).await?;
            write_fetched(&self.root, url, &body).await
        };
        match written.await {
            Ok(Placement::Written(path)) => CaptureOutcome::Written {
                url: url.clone(),
                path,
            },
            Ok(Placement::NotAFile(relative)) => CaptureOutcome::NotAFile {
                url: url.clone(),
                relative,
            },
            Err(error) => CaptureOutcome::Failed {
                url: url.clone(),
                error,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MirrorError;
    use crate::types::{IgnoreReason, ResourceType};
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct FakePage {
        closed: AtomicBool,
        bodies: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl ResponseSource for FakePage {
        fn is_open(&self) -> bool {
            !self.closed.load(Ordering::SeqCst)
        }

        async fn fetch_body(&self, response: &CapturedResponse) -> MirrorResult<Vec<u8>> {
            self.bodies
                .get(&response.url)
                .cloned()
                .ok_or_else(|| MirrorError::Body {
                    url: response.url.clone(),
                    reason: "No resource with given identifier found".into(),
                })
        }
    }

    fn response(url: &str, ty: ResourceType) -> CapturedResponse {
        CapturedResponse::new("req", url, 200, ty, "GET")
    }

    fn coordinator(page: FakePage) -> (tempfile::TempDir, CaptureCoordinator) {
        let dir = tempfile::tempdir().unwrap();
        let root = MirrorRoot::open(dir.path()).unwrap();
        (dir, CaptureCoordinator::new(root, Arc::new(page)))
    }

    #[tokio::test]
    async fn test_script_written() {
        let mut page = FakePage::default();
        page.bodies
            .insert("https://x/js/app.js".into(), b"run()".to_vec());
        let (dir, coord) = coordinator(page);

        let outcome = coord
            .capture(response("https://x/js/app.js", ResourceType::Script))
            .await;
        assert!(outcome.is_written());
        assert_eq!(std::fs::read(dir.path().join("app.js")).unwrap(), b"run()");
    }

    #[tokio::test]
    async fn test_ignored_response_never_fetches_body() {
        let (dir, coord) = coordinator(FakePage::default());
        let outcome = coord
            .capture(response("https://x/api/items", ResourceType::Xhr))
            .await;
        assert!(matches!(
            outcome,
            CaptureOutcome::Ignored {
                reason: IgnoreReason::NonAssetType { .. },
                ..
            }
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_closed_page_skips_capture() {
        let page = FakePage::default();
        page.closed.store(true, Ordering::SeqCst);
        let (_dir, coord) = coordinator(page);

        let outcome = coord
            .capture(response("https://x/app.js", ResourceType::Script))
            .await;
        assert!(matches!(outcome, CaptureOutcome::PageClosed { .. }));
        assert_eq!(coord.summary().page_closed, 1);
    }

    #[tokio::test]
    async fn test_body_failure_is_contained() {
        let mut page = FakePage::default();
        page.bodies.insert("https://x/ok.css".into(), b"a{}".to_vec());
        let (dir, coord) = coordinator(page);

        coord.dispatch(response("https://x/missing.js", ResourceType::Script));
        coord.dispatch(response("https://x/ok.css", ResourceType::Stylesheet));
        let outcomes = coord.drain().await;

        assert_eq!(outcomes.len(), 2);
        assert!(dir.path().join("ok.css").exists());
        let summary = coord.summary();
        assert_eq!(summary.written, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_inline_image_skips_body_fetch() {
        let (dir, coord) = coordinator(FakePage::default());
        let outcome = coord
            .capture(response("data:image/png;base64,AAAA", ResourceType::Image))
            .await;
        let CaptureOutcome::Written { path, .. } = outcome else {
            panic!("expected inline image to be written");
        };
        assert!(path.starts_with(dir.path()));
        assert_eq!(std::fs::read(path).unwrap(), vec![0u8, 0, 0]);
    }

    #[tokio::test]
    async fn test_extensionless_resource_not_written() {
        let mut page = FakePage::default();
        page.bodies.insert("https://x/font/roboto".into(), vec![1, 2]);
        let (dir, coord) = coordinator(page);

        let outcome = coord
            .capture(response("https://x/font/roboto", ResourceType::Font))
            .await;
        assert!(matches!(outcome, CaptureOutcome::NotAFile { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
