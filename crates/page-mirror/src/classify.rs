//! Response classification: which responses are worth persisting.

use crate::types::{CapturedResponse, IgnoreReason, ResourceType};

/// URL fragments that mark third-party analytics scripts.
pub const ANALYTICS_MARKERS: &[&str] = &["analytics.js"];

/// Decide whether a response should be dropped, and why.
///
/// Checks run in a fixed order and the first match wins.
pub fn classify(
    url: &str,
    status: u16,
    resource_type: ResourceType,
    method: &str,
) -> Option<IgnoreReason> {
    if ANALYTICS_MARKERS.iter().any(|m| url.contains(m)) {
        return Some(IgnoreReason::AnalyticsScript);
    }
    if (300..400).contains(&status) {
        return Some(IgnoreReason::Redirect { status });
    }
    if matches!(
        resource_type,
        ResourceType::Xhr | ResourceType::Fetch | ResourceType::Document
    ) {
        return Some(IgnoreReason::NonAssetType { resource_type });
    }
    if method == "OPTIONS" {
        return Some(IgnoreReason::Preflight);
    }
    if url.ends_with('/') {
        return Some(IgnoreReason::DirectoryUrl);
    }
    None
}

/// Classify a captured response, tracing the URL when it is dropped.
pub fn should_ignore(response: &CapturedResponse) -> Option<IgnoreReason> {
    let reason = classify(
        &response.url,
        response.status,
        response.resource_type,
        &response.method,
    )?;
    tracing::info!(url = %response.url, %reason, "Ignoring resource");
    Some(reason)
}
