// Copyright 2026 page-mirror Contributors
// SPDX-License-Identifier: MIT

//! page-mirror CLI library — drives Chromium through one page load and feeds
//! the capture pipeline.
//!
//! This library crate exposes the driver modules for integration testing.

pub mod cli;
pub mod config;
pub mod logging;
pub mod network;
pub mod renderer;
pub mod session;
pub mod watchdog;

pub use config::{ConfigOverrides, MirrorConfig};
pub use session::{MirrorSession, SessionReport};
