//! Core data types for captured responses and capture results.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The browser's classification of a network request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Document,
    Script,
    Stylesheet,
    Image,
    Font,
    Xhr,
    Fetch,
    Other,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Script => "script",
            Self::Stylesheet => "stylesheet",
            Self::Image => "image",
            Self::Font => "font",
            Self::Xhr => "xhr",
            Self::Fetch => "fetch",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses browser resource type names (`"XHR"`, `"Stylesheet"`, `"script"`).
///
/// Anything unrecognised (media, manifest, ping, preflight...) is `Other`.
impl FromStr for ResourceType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "document" => Self::Document,
            "script" => Self::Script,
            "stylesheet" => Self::Stylesheet,
            "image" => Self::Image,
            "font" => Self::Font,
            "xhr" => Self::Xhr,
            "fetch" => Self::Fetch,
            _ => Self::Other,
        })
    }
}

/// One network response observed while the page was open.
///
/// The body is not carried here; it is fetched through
/// [`crate::ResponseSource::fetch_body`] once the response is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResponse {
    /// Opaque browser identifier used to fetch the body.
    pub request_id: String,
    pub url: String,
    pub status: u16,
    pub resource_type: ResourceType,
    pub method: String,
}

impl CapturedResponse {
    pub fn new(
        request_id: impl Into<String>,
        url: impl Into<String>,
        status: u16,
        resource_type: ResourceType,
        method: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            url: url.into(),
            status,
            resource_type,
            method: method.into(),
        }
    }

    /// Whether the URL carries an inline base64 image instead of a network path.
    pub fn is_inline_image(&self) -> bool {
        self.url.starts_with("data:image")
    }
}

/// Why a response was not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IgnoreReason {
    AnalyticsScript,
    Redirect { status: u16 },
    NonAssetType { resource_type: ResourceType },
    Preflight,
    DirectoryUrl,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnalyticsScript => f.write_str("analytics script"),
            Self::Redirect { status } => write!(f, "redirect ({status})"),
            Self::NonAssetType { resource_type } => write!(f, "{resource_type} response"),
            Self::Preflight => f.write_str("OPTIONS request"),
            Self::DirectoryUrl => f.write_str("directory URL"),
        }
    }
}

/// What happened to a single captured response.
#[derive(Debug)]
pub enum CaptureOutcome {
    Written { url: String, path: PathBuf },
    Ignored { url: String, reason: IgnoreReason },
    /// The resolved path does not look like a file, so nothing was written.
    NotAFile { url: String, relative: String },
    /// The page closed before the body could be read.
    PageClosed { url: String },
    Failed { url: String, error: crate::MirrorError },
}

impl CaptureOutcome {
    pub fn url(&self) -> &str {
        match self {
            Self::Written { url, .. }
            | Self::Ignored { url, .. }
            | Self::NotAFile { url, .. }
            | Self::PageClosed { url }
            | Self::Failed { url, .. } => url,
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written { .. })
    }
}

/// Counters over every outcome the coordinator has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSummary {
    pub dispatched: usize,
    pub written: usize,
    pub ignored: usize,
    pub not_a_file: usize,
    pub page_closed: usize,
    pub failed: usize,
}

impl CaptureSummary {
    /// Responses whose task has not reported back yet.
    pub fn in_flight(&self) -> usize {
        self.dispatched.saturating_sub(
            self.written + self.ignored + self.not_a_file + self.page_closed + self.failed,
        )
    }
}
