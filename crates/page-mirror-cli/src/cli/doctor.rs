//! Environment readiness check.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::config::resolve_mirror_root;
use crate::renderer::chromium::{find_chromium, CHROMIUM_PATH_ENV};

/// Check Chromium availability and whether the mirror root is writable.
pub async fn run(mirror_root: Option<PathBuf>, chrome_path: Option<PathBuf>) -> Result<()> {
    println!("page-mirror doctor");
    println!("==================");
    println!();

    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!();

    let chromium_path = find_chromium(chrome_path.as_deref());
    match &chromium_path {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome/Chromium or set {CHROMIUM_PATH_ENV}."
        ),
    }

    let root = resolve_mirror_root(mirror_root);
    let writable = match check_writable(&root) {
        Ok(()) => {
            println!("[OK] Mirror root is writable: {}", root.display());
            true
        }
        Err(e) => {
            println!("[!!] Mirror root is not writable: {} ({e})", root.display());
            false
        }
    };

    println!();
    if chromium_path.is_some() && writable {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }

    Ok(())
}

/// Create the directory if needed and prove a file can be written into it.
fn check_writable(root: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(root)?;
    let probe = root.join(".page-mirror-probe");
    std::fs::write(&probe, b"ok")?;
    std::fs::remove_file(&probe)
}
