//! Persisting captured resources under the mirror root.

use std::path::PathBuf;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;

use crate::error::{MirrorError, MirrorResult};
use crate::resolve::{is_writable_path, resolve};
use crate::root::MirrorRoot;

/// Browsers emit inline images with and without padding.
const INLINE_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Where a fetched resource ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Written(PathBuf),
    /// The resolved path did not look like a file; nothing was written.
    NotAFile(String),
}

/// Decode a `data:image` URL and write it as `image_<epoch millis>.png`.
///
/// Two images decoded in the same millisecond share a name and the later one
/// wins.
pub async fn write_inline_image(root: &MirrorRoot, url: &str) -> MirrorResult<PathBuf> {
    let (_, payload) = url
        .split_once(',')
        .ok_or_else(|| MirrorError::MissingPayload {
            url: url.to_string(),
        })?;
    let bytes = INLINE_BASE64
        .decode(payload.trim())
        .map_err(|e| MirrorError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let name = format!("image_{}.png", chrono::Utc::now().timestamp_millis());
    let dest = root.join(name);
    tokio::fs::write(&dest, &bytes)
        .await
        .map_err(|e| MirrorError::io(&dest, e))?;
    tracing::info!(path = %dest.display(), bytes = bytes.len(), "Inline image written");
    Ok(dest)
}

/// Write a fetched body verbatim to its flattened location.
///
/// No directories are created: only basenames pass the write guard, and
/// those sit directly under the root.
pub async fn write_fetched(root: &MirrorRoot, url: &str, body: &[u8]) -> MirrorResult<Placement> {
    let relative = resolve(url)?;
    if !is_writable_path(&relative) {
        tracing::debug!(url, relative = %relative, "Not a file path, skipping");
        return Ok(Placement::NotAFile(relative));
    }

    let dest = root.join(&relative);
    tracing::debug!(url, path = %dest.display(), "Copying resource");
    tokio::fs::write(&dest, body)
        .await
        .map_err(|e| MirrorError::io(&dest, e))?;
    tracing::info!(url, path = %dest.display(), bytes = body.len(), "Resource written");
    Ok(Placement::Written(dest))
}
