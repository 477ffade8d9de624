//! Output mode shared by the subcommands.

/// Set by `--json`; commands print machine-readable results instead of text.
pub const JSON_ENV: &str = "PAGE_MIRROR_JSON";

pub fn is_json() -> bool {
    std::env::var(JSON_ENV).map(|v| v == "1").unwrap_or(false)
}

/// Print a value as a single JSON line on stdout.
///
/// JSON log lines share stdout in `--json` mode, so the whole stream stays
/// newline-delimited JSON.
pub fn print_json<T: serde::Serialize>(value: &T) {
    match json_line(value) {
        Ok(s) => println!("{s}"),
        Err(e) => tracing::error!("Failed to serialize output: {e}"),
    }
}

fn json_line<T: serde::Serialize>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string(value)
}
