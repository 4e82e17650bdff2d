//! `tagcheck config` — Print the resolved run configuration.

use std::io::Write;

use clap::Args;

use super::args::HarnessArgs;

/// Arguments for the `config` command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(flatten)]
    harness: HarnessArgs,
}

/// Executes the `config` command.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or cannot be printed.
pub fn execute(args: ConfigArgs) -> anyhow::Result<()> {
    let config = args.harness.into_config()?;
    let json = serde_json::to_string_pretty(&config.redacted())?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{json}")?;
    Ok(())
}
