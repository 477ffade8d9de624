//! CLI subcommand implementations for the page-mirror binary.

pub mod doctor;
pub mod mirror_cmd;
pub mod output;
