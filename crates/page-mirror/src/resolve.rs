//! URL to mirror-path mapping.
//!
//! Paths are flattened: anything that looks like a file keeps only its final
//! segment, so `https://a/x/style.css` and `https://b/y/style.css` both land on
//! `style.css` and the later write wins.

use url::Url;

use crate::error::{MirrorError, MirrorResult};

/// Map a resource URL to a path relative to the mirror root.
///
/// A path containing a `.` is reduced to its basename. Other paths are kept
/// whole (minus the leading `/`) and are later rejected by
/// [`is_writable_path`].
pub fn resolve(url: &str) -> MirrorResult<String> {
    let parsed = Url::parse(url).map_err(|e| MirrorError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let path = parsed.path();

    if path.contains('.') {
        return Ok(basename(path).to_string());
    }
    Ok(path.trim_start_matches('/').to_string())
}

/// Write-time guard: only paths that look like files are persisted.
pub fn is_writable_path(relative: &str) -> bool {
    !relative.ends_with('/') && relative.contains('.')
}

/// Final segment of a `/`-separated path, ignoring trailing separators.
fn basename(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}
