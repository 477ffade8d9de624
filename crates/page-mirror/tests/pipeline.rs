//! End-to-end pipeline tests against an in-memory page.
//!
//! The fake page plays both browser roles: it serves response bodies to the
//! capture coordinator and answers DOM queries for the rewriter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use page_mirror::rewrite::{SCRIPT_SELECTOR, STYLESHEET_SELECTOR};
use page_mirror::*;

// ─────────────────────── helpers ───────────────────────

#[derive(Default)]
struct FakePage {
    closed: AtomicBool,
    bodies: HashMap<String, Vec<u8>>,
    /// Artificial latency per URL, to force completion order.
    delays: HashMap<String, Duration>,
    markup: String,
    scripts: Vec<String>,
    stylesheets: Vec<String>,
    fail_dom: bool,
}

#[async_trait]
impl ResponseSource for FakePage {
    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn fetch_body(&self, response: &CapturedResponse) -> MirrorResult<Vec<u8>> {
        if let Some(delay) = self.delays.get(&response.url) {
            tokio::time::sleep(*delay).await;
        }
        self.bodies
            .get(&response.url)
            .cloned()
            .ok_or_else(|| MirrorError::Body {
                url: response.url.clone(),
                reason: "no body".into(),
            })
    }
}

#[async_trait]
impl DocumentSource for FakePage {
    async fn serialize_document(&self) -> MirrorResult<String> {
        Ok(self.markup.clone())
    }

    async fn attribute_values(
        &self,
        selector: &str,
        _attribute: &str,
    ) -> MirrorResult<Vec<String>> {
        if self.fail_dom {
            return Err(MirrorError::Dom {
                query: selector.to_string(),
                reason: "Target closed".into(),
            });
        }
        Ok(match selector {
            SCRIPT_SELECTOR => self.scripts.clone(),
            STYLESHEET_SELECTOR => self.stylesheets.clone(),
            _ => Vec::new(),
        })
    }
}

fn get(id: &str, url: &str, ty: ResourceType) -> CapturedResponse {
    CapturedResponse::new(id, url, 200, ty, "GET")
}

fn files_in(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

const PAGE: &str = concat!(
    "<!DOCTYPE html><html><head>",
    r#"<link rel="stylesheet" href="/style.css">"#,
    r#"<script type="module" src="/main.js"></script>"#,
    "</head><body><h1>Hi</h1></body></html>"
);

// ─────────────────────── end to end ───────────────────────

#[tokio::test]
async fn captured_script_is_inlined_and_stylesheet_relativized() {
    let dir = tempfile::tempdir().unwrap();
    let root = MirrorRoot::open(dir.path().join("app")).unwrap();

    let mut page = FakePage {
        markup: PAGE.to_string(),
        scripts: vec!["/main.js".into()],
        stylesheets: vec!["/style.css".into()],
        ..Default::default()
    };
    page.bodies
        .insert("https://site.test/main.js".into(), b"console.log(1)".to_vec());
    page.bodies
        .insert("https://site.test/style.css".into(), b"h1{color:red}".to_vec());
    let page = Arc::new(page);

    let coordinator = CaptureCoordinator::new(root.clone(), page.clone());
    coordinator.dispatch(get("1", "https://site.test/", ResourceType::Document));
    coordinator.dispatch(get("2", "https://site.test/main.js", ResourceType::Script));
    coordinator.dispatch(get("3", "https://site.test/style.css", ResourceType::Stylesheet));
    coordinator.drain().await;

    let report = DocumentRewriter::new(root.clone())
        .run(&*page)
        .await
        .unwrap();

    let html = std::fs::read_to_string(root.document_path()).unwrap();
    assert!(html.contains(r#"<script type="module" src="./main.js">console.log(1)</script>"#));
    assert!(html.contains(r#"href="./style.css""#));
    assert!(!html.contains(r#"href="/style.css""#));
    assert_eq!(report.scripts_inlined, 1);
    assert_eq!(report.scripts_missing, 0);
    assert_eq!(report.stylesheets_relativized, 1);
    assert_eq!(report.markup_len, PAGE.len());

    assert_eq!(files_in(root.path()), vec!["index.html", "main.js", "style.css"]);
    let summary = coordinator.summary();
    assert_eq!(summary.dispatched, 3);
    assert_eq!(summary.written, 2);
    assert_eq!(summary.ignored, 1);
}

#[tokio::test]
async fn missing_script_leaves_tag_byte_for_byte() {
    let dir = tempfile::tempdir().unwrap();
    let root = MirrorRoot::open(dir.path()).unwrap();
    let page = FakePage {
        markup: PAGE.to_string(),
        scripts: vec!["/main.js".into()],
        ..Default::default()
    };

    let report = DocumentRewriter::new(root.clone()).run(&page).await.unwrap();

    let html = std::fs::read_to_string(root.document_path()).unwrap();
    assert_eq!(html, PAGE);
    assert_eq!(report.scripts_missing, 1);
    assert_eq!(report.scripts_inlined, 0);
}

#[tokio::test]
async fn document_overwritten_on_each_run() {
    let dir = tempfile::tempdir().unwrap();
    let root = MirrorRoot::open(dir.path()).unwrap();
    std::fs::write(root.document_path(), "stale").unwrap();

    let page = FakePage {
        markup: "<html></html>".into(),
        ..Default::default()
    };
    DocumentRewriter::new(root.clone()).run(&page).await.unwrap();

    assert_eq!(
        std::fs::read_to_string(root.document_path()).unwrap(),
        "<html></html>"
    );
}

#[tokio::test]
async fn dom_failure_aborts_rewrite_without_document() {
    let dir = tempfile::tempdir().unwrap();
    let root = MirrorRoot::open(dir.path()).unwrap();
    let page = FakePage {
        markup: PAGE.to_string(),
        fail_dom: true,
        ..Default::default()
    };

    let err = DocumentRewriter::new(root.clone()).run(&page).await.unwrap_err();
    assert_eq!(err.scope(), ErrorScope::Rewrite);
    assert!(!root.document_path().exists());
}

// ─────────────────────── capture properties ───────────────────────

#[tokio::test]
async fn colliding_basenames_leave_exactly_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let root = MirrorRoot::open(dir.path()).unwrap();

    let mut page = FakePage::default();
    page.bodies
        .insert("https://a.test/x/style.css".into(), b"/* a */".to_vec());
    page.bodies
        .insert("https://b.test/y/style.css".into(), b"/* b */".to_vec());
    let coordinator = CaptureCoordinator::new(root.clone(), Arc::new(page));

    coordinator.dispatch(get("1", "https://a.test/x/style.css", ResourceType::Stylesheet));
    coordinator.dispatch(get("2", "https://b.test/y/style.css", ResourceType::Stylesheet));
    coordinator.drain().await;

    assert_eq!(files_in(root.path()), vec!["style.css"]);
    let content = std::fs::read(root.join("style.css")).unwrap();
    assert!(content == b"/* a */" || content == b"/* b */");
}

#[tokio::test]
async fn later_completion_wins_collision() {
    let dir = tempfile::tempdir().unwrap();
    let root = MirrorRoot::open(dir.path()).unwrap();

    let mut page = FakePage::default();
    page.bodies
        .insert("https://a.test/x/logo.svg".into(), b"slow".to_vec());
    page.bodies
        .insert("https://b.test/y/logo.svg".into(), b"fast".to_vec());
    page.delays
        .insert("https://a.test/x/logo.svg".into(), Duration::from_millis(200));
    let coordinator = CaptureCoordinator::new(root.clone(), Arc::new(page));

    coordinator.dispatch(get("1", "https://a.test/x/logo.svg", ResourceType::Image));
    coordinator.dispatch(get("2", "https://b.test/y/logo.svg", ResourceType::Image));
    coordinator.drain().await;

    assert_eq!(std::fs::read(root.join("logo.svg")).unwrap(), b"slow");
}

#[tokio::test]
async fn ignored_and_guarded_responses_write_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let root = MirrorRoot::open(dir.path()).unwrap();

    let mut page = FakePage::default();
    page.bodies.insert("https://x.test/api/data".into(), b"{}".to_vec());
    let coordinator = CaptureCoordinator::new(root.clone(), Arc::new(page));

    coordinator.dispatch(CapturedResponse::new(
        "1",
        "https://x.test/a.js",
        302,
        ResourceType::Script,
        "GET",
    ));
    coordinator.dispatch(CapturedResponse::new(
        "2",
        "https://x.test/a.js",
        204,
        ResourceType::Other,
        "OPTIONS",
    ));
    coordinator.dispatch(get("3", "https://x.test/assets/", ResourceType::Image));
    coordinator.dispatch(get("4", "https://x.test/api/data", ResourceType::Other));
    let outcomes = coordinator.drain().await;

    assert_eq!(outcomes.len(), 4);
    assert!(outcomes.iter().all(|o| !o.is_written()));
    assert!(files_in(root.path()).is_empty());
    let summary = coordinator.summary();
    assert_eq!(summary.ignored, 3);
    assert_eq!(summary.not_a_file, 1);
}

#[tokio::test]
async fn inline_image_lands_as_timestamped_png() {
    let dir = tempfile::tempdir().unwrap();
    let root = MirrorRoot::open(dir.path()).unwrap();
    let coordinator = CaptureCoordinator::new(root.clone(), Arc::new(FakePage::default()));

    coordinator.dispatch(get("1", "data:image/png;base64,AAAA", ResourceType::Image));
    coordinator.drain().await;

    let files = files_in(root.path());
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("image_") && files[0].ends_with(".png"));
    assert_eq!(std::fs::read(root.join(&files[0])).unwrap(), vec![0u8, 0, 0]);
}

#[tokio::test]
async fn rewrite_runs_even_when_every_capture_failed() {
    let dir = tempfile::tempdir().unwrap();
    let root = MirrorRoot::open(dir.path()).unwrap();
    let page = Arc::new(FakePage {
        markup: PAGE.to_string(),
        scripts: vec!["/main.js".into()],
        stylesheets: vec!["/style.css".into()],
        ..Default::default()
    });
    let coordinator = CaptureCoordinator::new(root.clone(), page.clone());
    coordinator.dispatch(get("1", "https://site.test/main.js", ResourceType::Script));
    coordinator.drain().await;
    assert_eq!(coordinator.summary().failed, 1);

    let report = DocumentRewriter::new(root.clone())
        .run(&*page)
        .await
        .unwrap();
    assert_eq!(report.scripts_missing, 1);
    assert!(root.document_path().exists());
}
