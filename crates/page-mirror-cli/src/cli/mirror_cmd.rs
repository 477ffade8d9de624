//! `page-mirror mirror <url>` — save one page as a static copy.

use anyhow::Result;

use crate::cli::output;
use crate::config::{ConfigOverrides, MirrorConfig};
use crate::session::MirrorSession;

/// Run the mirror command.
pub async fn run(overrides: ConfigOverrides) -> Result<()> {
    let config = MirrorConfig::resolve(overrides)?;
    tracing::info!(
        url = %config.target_url,
        root = %config.mirror_root.display(),
        "Mirroring page"
    );

    let session = MirrorSession::new(config);
    let report = match session.run().await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Failed to mirror site: {e:#}");
            return Err(e);
        }
    };

    let capture = &report.capture;
    tracing::info!(
        written = capture.written,
        ignored = capture.ignored,
        skipped = capture.not_a_file + capture.page_closed,
        failed = capture.failed,
        "Capture finished"
    );
    match &report.rewrite {
        Some(rewrite) => tracing::info!(
            document = %rewrite.document.display(),
            scripts_inlined = rewrite.scripts_inlined,
            scripts_missing = rewrite.scripts_missing,
            stylesheets = rewrite.stylesheets_relativized,
            "Mirror ready"
        ),
        None => tracing::warn!("Mirror finished without a rewritten document"),
    }

    if output::is_json() {
        output::print_json(&report);
    }
    Ok(())
}
