//! # tagcheck
//!
//! Acceptance tests for container image tags.
//! Starts every tag, waits for init, collects metadata, optionally
//! screenshots the web UI, then renders and publishes the report.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod commands;
mod logging;

use std::process::ExitCode;

use clap::Parser;

use crate::commands::Cli;

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    commands::execute(cli)
}
