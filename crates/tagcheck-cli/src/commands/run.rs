//! `tagcheck run` — Test every tag, then render and publish the report.

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use tagcheck_common::config::HarnessConfig;
use tagcheck_common::types::RunReport;
use tagcheck_report::artifacts::write_artifacts;
use tagcheck_report::publish::publish_run;
use tagcheck_report::store::DirectoryStore;
use tagcheck_runtime::backend::{self, ContainerRuntime};
use tagcheck_runtime::clock::{Clock, SystemClock};
use tagcheck_runtime::orchestrator::{TagTestSettings, TagTester, ensure_runtime_available};
use tagcheck_runtime::visual::ScreenshotVerifier;
use tagcheck_runtime::visual::probe::{HttpProbe, RetryPolicy};
use tagcheck_runtime::visual::webdriver::WebDriverClient;

use super::args::HarnessArgs;
use crate::logging;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    harness: HarnessArgs,
}

/// Executes the `run` command.
///
/// Exits with success only when every check of every tag passed.
///
/// # Errors
///
/// Returns an error for invalid configuration, an unreachable container
/// engine, or a failure to write or publish the artifacts.
pub fn execute(args: RunArgs, log_level: &str) -> anyhow::Result<ExitCode> {
    let config = args.harness.into_config()?;
    let run_dir = config.run_dir();
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("cannot create output directory {}", run_dir.display()))?;
    let _log_guard = logging::init(log_level, &run_dir, config.storage.secrets())?;

    tracing::info!(
        image = %config.image,
        meta_tag = %config.meta_tag,
        base = %config.base,
        tags = ?config.tags,
        screenshot = config.screenshot.enabled,
        "starting tag tests"
    );

    let runtime = backend::detect_runtime()?;
    ensure_runtime_available(runtime.as_ref())?;

    let report = run_tags(&config, runtime.as_ref(), &SystemClock, &run_dir)?;

    let _ = write_artifacts(&report, &run_dir)?;
    let store = DirectoryStore::new(&config.storage.publish_dir);
    let _ = publish_run(&store, &run_dir, &config.image, &config.meta_tag).inspect_err(|e| {
        tracing::error!(error = %e, "publishing failed");
    })?;

    tracing::info!(status = %report.status, "tagcheck finished");
    Ok(if report.is_pass() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run_tags(
    config: &HarnessConfig,
    runtime: &dyn ContainerRuntime,
    clock: &dyn Clock,
    run_dir: &Path,
) -> anyhow::Result<RunReport> {
    let report = RunReport::new(&config.image, &config.meta_tag);
    let settings = TagTestSettings::from(config);

    if !config.screenshot.enabled {
        return Ok(TagTester::new(runtime, clock, settings).run(report, &config.tags));
    }

    let probe = HttpProbe::new(RetryPolicy::default(), clock)?;
    let browser = WebDriverClient::new(&config.screenshot.webdriver_url)?;
    let verifier = ScreenshotVerifier::new(
        runtime,
        clock,
        Box::new(probe),
        Box::new(browser),
        config.web.clone(),
        &config.screenshot.helper_image,
        Duration::from_secs(config.screenshot.delay_secs),
        run_dir,
    );
    let tester = TagTester::new(runtime, clock, settings).with_visual_check(&verifier);
    Ok(tester.run(report, &config.tags))
}
