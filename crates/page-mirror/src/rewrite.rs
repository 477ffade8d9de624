//! Post-settle document rewriting.
//!
//! Module scripts that were captured are inlined into their tag, stylesheet
//! links are made relative to the saved document, and the result is written
//! as `index.html`.

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{MirrorError, MirrorResult};
use crate::root::MirrorRoot;

/// Scripts considered for inlining.
pub const SCRIPT_SELECTOR: &str = "script[src]";

/// Stylesheet links to relativize.
pub const STYLESHEET_SELECTOR: &str = "link[rel='stylesheet']";

/// The settled DOM as seen by the rewriter.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Full serialization of the current document, doctype included.
    async fn serialize_document(&self) -> MirrorResult<String>;
    /// The given attribute of every element matching `selector`, in document
    /// order. Elements without the attribute are skipped.
    async fn attribute_values(&self, selector: &str, attribute: &str)
        -> MirrorResult<Vec<String>>;
}

/// What the rewrite pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteReport {
    /// Length of the settled markup before rewriting.
    pub markup_len: usize,
    pub scripts_inlined: usize,
    pub scripts_missing: usize,
    pub stylesheets_relativized: usize,
    pub document: PathBuf,
}

/// Rewrites the settled document against a mirror root.
pub struct DocumentRewriter {
    root: MirrorRoot,
}

impl DocumentRewriter {
    pub fn new(root: MirrorRoot) -> Self {
        Self { root }
    }

    /// Capture, rewrite and save the document.
    ///
    /// DOM and write failures abort the pass. Whatever was written before the
    /// failure stays on disk.
    pub async fn run(&self, source: &dyn DocumentSource) -> MirrorResult<RewriteReport> {
        let mut markup = source.serialize_document().await?;
        let markup_len = markup.len();
        tracing::info!(len = markup_len, "Page content captured");

        let scripts = dedup(source.attribute_values(SCRIPT_SELECTOR, "src").await?);
        let mut scripts_inlined = 0;
        let mut scripts_missing = 0;
        for src in &scripts {
            let Some(path) = self.root.lookup(src) else {
                tracing::warn!(src = %src, "Script not found, leaving tag untouched");
                scripts_missing += 1;
                continue;
            };
            let content = match tokio::fs::read(&path).await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    tracing::warn!(src = %src, path = %path.display(), "Failed to read captured script: {e}");
                    scripts_missing += 1;
                    continue;
                }
            };
            let (patched, count) = inline_module_script(&markup, src, &content);
            if count == 0 {
                tracing::debug!(src = %src, "No module script tag to inline");
            }
            scripts_inlined += count;
            markup = patched;
        }

        let stylesheets = dedup(source.attribute_values(STYLESHEET_SELECTOR, "href").await?);
        let mut stylesheets_relativized = 0;
        for href in &stylesheets {
            let (patched, count) = relativize_href(&markup, href);
            stylesheets_relativized += count;
            markup = patched;
        }

        let document = self.root.document_path();
        tokio::fs::write(&document, &markup)
            .await
            .map_err(|e| {
                MirrorError::Document(format!("failed to write {}: {e}", document.display()))
            })?;
        tracing::info!(path = %document.display(), "Page saved");

        Ok(RewriteReport {
            markup_len,
            scripts_inlined,
            scripts_missing,
            stylesheets_relativized,
            document,
        })
    }
}

/// Replace each literal `<script type="module" src="SRC"></script>` with the
/// same tag carrying a relative `src` and the captured source inline.
///
/// The `src` attribute stays alongside the inline body. Returns the patched
/// markup and the number of tags replaced.
pub fn inline_module_script(markup: &str, src: &str, content: &str) -> (String, usize) {
    let mut patched = markup.to_string();
    let mut count = 0;
    for form in attribute_forms(src) {
        let needle = format!(r#"<script type="module" src="{form}"></script>"#);
        let hits = patched.matches(&needle).count();
        if hits == 0 {
            continue;
        }
        let local = relativize(&form).unwrap_or_else(|| form.clone());
        let replacement = format!(r#"<script type="module" src="{local}">{content}</script>"#);
        patched = patched.replace(&needle, &replacement);
        count += hits;
    }
    (patched, count)
}

/// Rewrite every literal `href="HREF"` to its relative form.
pub fn relativize_href(markup: &str, href: &str) -> (String, usize) {
    let mut patched = markup.to_string();
    let mut count = 0;
    for form in attribute_forms(href) {
        let Some(local) = relativize(&form) else {
            continue;
        };
        let needle = format!(r#"href="{form}""#);
        let hits = patched.matches(&needle).count();
        if hits > 0 {
            patched = patched.replace(&needle, &format!(r#"href="{local}""#));
            count += hits;
        }
    }
    (patched, count)
}

/// Make a reference relative to the saved document.
///
/// `/style.css` and `style.css` both become `./style.css`. Returns `None` for
/// references that are already relative, absolute URLs, and fragments.
pub fn relativize(reference: &str) -> Option<String> {
    if reference.is_empty()
        || reference.starts_with("./")
        || reference.starts_with("../")
        || reference.starts_with("//")
        || reference.starts_with('#')
        || has_scheme(reference)
    {
        return None;
    }
    match reference.strip_prefix('/') {
        Some(rest) => Some(format!("./{rest}")),
        None => Some(format!("./{reference}")),
    }
}

fn has_scheme(reference: &str) -> bool {
    match reference.split_once(':') {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// The raw attribute value and, when different, its serialized form.
fn attribute_forms(value: &str) -> Vec<String> {
    let escaped = value.replace('&', "&amp;");
    if escaped == value {
        vec![value.to_string()]
    } else {
        vec![value.to_string(), escaped]
    }
}

fn dedup(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}
