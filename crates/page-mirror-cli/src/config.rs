//! Configuration loading and resolution.
//!
//! Every value resolves as: command-line flag, then environment variable,
//! then built-in default.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::renderer::chromium::{BrowserOptions, CHROMIUM_PATH_ENV};

/// Environment variable holding the page to mirror.
pub const TARGET_URL_ENV: &str = "PAGE_MIRROR_URL";

/// Environment variable holding the mirror root directory.
pub const MIRROR_ROOT_ENV: &str = "PAGE_MIRROR_ROOT";

/// Mirror root used when nothing else is configured.
pub const DEFAULT_MIRROR_ROOT: &str = "app";

/// Upper bound on page navigation (20 minutes).
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 20 * 60 * 1000;

/// Wait after load for client-side scripts to finish mutating the DOM.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 5_000;

/// Hard limit before the watchdog tears the browser down (3 minutes).
pub const DEFAULT_WATCHDOG_TIMEOUT_MS: u64 = 3 * 60 * 1000;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No target URL given. Pass one as an argument or set {TARGET_URL_ENV}.")]
    MissingUrl,

    #[error("Invalid target URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unsupported URL scheme `{0}` (expected http, https or file)")]
    UnsupportedScheme(String),
}

/// Values supplied on the command line. `None` falls through to the
/// environment and then the defaults.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub target_url: Option<String>,
    pub mirror_root: Option<PathBuf>,
    pub navigation_timeout_ms: Option<u64>,
    pub settle_delay_ms: Option<u64>,
    pub watchdog_timeout_ms: Option<u64>,
    pub headful: bool,
    pub chrome_path: Option<PathBuf>,
}

/// Fully resolved settings for one mirror session.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub target_url: Url,
    pub mirror_root: PathBuf,
    pub navigation_timeout: Duration,
    pub settle_delay: Duration,
    pub watchdog_timeout: Duration,
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
}

impl MirrorConfig {
    /// Resolve against the process environment.
    pub fn resolve(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve against an arbitrary environment lookup.
    pub fn resolve_with<F>(overrides: ConfigOverrides, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let raw_url = overrides
            .target_url
            .or_else(|| lookup(TARGET_URL_ENV))
            .ok_or(ConfigError::MissingUrl)?;
        let target_url = parse_target_url(&raw_url)?;

        let mirror_root = overrides
            .mirror_root
            .or_else(|| lookup(MIRROR_ROOT_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MIRROR_ROOT));

        let chrome_path = overrides
            .chrome_path
            .or_else(|| lookup(CHROMIUM_PATH_ENV).map(PathBuf::from));

        Ok(Self {
            target_url,
            mirror_root,
            navigation_timeout: Duration::from_millis(
                overrides
                    .navigation_timeout_ms
                    .unwrap_or(DEFAULT_NAVIGATION_TIMEOUT_MS),
            ),
            settle_delay: Duration::from_millis(
                overrides.settle_delay_ms.unwrap_or(DEFAULT_SETTLE_DELAY_MS),
            ),
            watchdog_timeout: Duration::from_millis(
                overrides
                    .watchdog_timeout_ms
                    .unwrap_or(DEFAULT_WATCHDOG_TIMEOUT_MS),
            ),
            headless: !overrides.headful,
            chrome_path,
        })
    }

    pub fn browser_options(&self) -> BrowserOptions {
        BrowserOptions {
            headless: self.headless,
            chrome_path: self.chrome_path.clone(),
        }
    }
}

/// Resolve the mirror root the same way `mirror` would, without a URL.
pub fn resolve_mirror_root(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }

    if let Ok(env_path) = std::env::var(MIRROR_ROOT_ENV) {
        if !env_path.trim().is_empty() {
            return PathBuf::from(env_path);
        }
    }

    PathBuf::from(DEFAULT_MIRROR_ROOT)
}

/// Parse and validate the page to mirror.
pub fn parse_target_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" | "file" => Ok(url),
        other => Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
}
