//! The mirror root directory that owns every artifact of a session.

use std::path::{Component, Path, PathBuf};

use crate::error::{MirrorError, MirrorResult};

/// File name of the rewritten document.
pub const DOCUMENT_NAME: &str = "index.html";

/// A directory holding one mirrored page. Never cleaned up automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRoot {
    path: PathBuf,
}

impl MirrorRoot {
    /// Open the root, creating it (and its parents) if absent.
    pub fn open(path: impl Into<PathBuf>) -> MirrorResult<Self> {
        let path = path.into();
        std::fs::create_dir_all(&path).map_err(|source| MirrorError::Root {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.path.join(relative)
    }

    /// Where the final `index.html` goes.
    pub fn document_path(&self) -> PathBuf {
        self.path.join(DOCUMENT_NAME)
    }

    /// Find a previously captured file for a DOM reference such as `/main.js`.
    ///
    /// One leading `/` is stripped. References that would leave the root
    /// are treated as missing.
    pub fn lookup(&self, reference: &str) -> Option<PathBuf> {
        let relative = Path::new(reference.strip_prefix('/').unwrap_or(reference));
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained || relative.as_os_str().is_empty() {
            return None;
        }
        let candidate = self.path.join(relative);
        candidate.is_file().then_some(candidate)
    }
}
