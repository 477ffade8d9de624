// Copyright 2026 page-mirror Contributors
// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use page_mirror_cli::cli;
use page_mirror_cli::config::ConfigOverrides;

#[derive(Parser)]
#[command(
    name = "page-mirror",
    about = "page-mirror — save a live web page as a locally runnable static copy",
    version,
    after_help = "Run 'page-mirror <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a page in Chromium and save it with its assets
    Mirror {
        /// Page to mirror (falls back to PAGE_MIRROR_URL)
        url: Option<String>,
        /// Directory to write the mirror into (falls back to PAGE_MIRROR_ROOT, then ./app)
        #[arg(long, short)]
        out: Option<PathBuf>,
        /// Navigation timeout in milliseconds
        #[arg(long)]
        navigation_timeout: Option<u64>,
        /// Wait after load before capturing the DOM, in milliseconds
        #[arg(long)]
        settle: Option<u64>,
        /// Hard limit for the whole session, in milliseconds
        #[arg(long)]
        watchdog: Option<u64>,
        /// Show the browser window instead of running headless
        #[arg(long)]
        headful: bool,
        /// Path to the Chrome/Chromium binary
        #[arg(long)]
        chrome: Option<PathBuf>,
    },
    /// Check environment and diagnose issues
    Doctor {
        /// Mirror root to check
        #[arg(long, short)]
        out: Option<PathBuf>,
        /// Path to the Chrome/Chromium binary
        #[arg(long)]
        chrome: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.json {
        std::env::set_var(cli::output::JSON_ENV, "1");
    }
    page_mirror_cli::logging::init(&cli.log_level, cli.json);

    let result = match cli.command {
        Commands::Mirror {
            url,
            out,
            navigation_timeout,
            settle,
            watchdog,
            headful,
            chrome,
        } => {
            cli::mirror_cmd::run(ConfigOverrides {
                target_url: url,
                mirror_root: out,
                navigation_timeout_ms: navigation_timeout,
                settle_delay_ms: settle,
                watchdog_timeout_ms: watchdog,
                headful,
                chrome_path: chrome,
            })
            .await
        }
        Commands::Doctor { out, chrome } => cli::doctor::run(out, chrome).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "page-mirror", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        } else {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
