//! CLI command definitions and dispatch.

pub mod args;
pub mod config;
pub mod run;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

/// tagcheck — acceptance tests for container image tags.
#[derive(Parser, Debug)]
#[command(name = "tagcheck", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Log filter directive, e.g. `info` or `tagcheck_runtime=debug`.
    #[arg(long, global = true, env = "CI_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Test every tag, write the report and publish it.
    Run(run::RunArgs),
    /// Print the resolved configuration with credentials masked.
    Config(config::ConfigArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Run(args) => run::execute(args, &cli.log_level),
        Command::Config(args) => config::execute(args).map(|()| ExitCode::SUCCESS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn run_parses_required_flags() {
        let cli = Cli::try_parse_from([
            "tagcheck",
            "--log-level",
            "debug",
            "run",
            "--image",
            "linuxserver/nginx",
            "--base",
            "alpine",
            "--tags",
            "1.0|latest",
            "--meta-tag",
            "1.0-ls1",
        ])
        .expect("parse");
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Command::Run(_)));
    }
}
