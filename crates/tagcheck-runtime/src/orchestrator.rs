//! Per-tag test lifecycle.
//!
//! Each tag walks `Starting → AwaitingReady → ExtractingVersion →
//! DumpingPackages → Settling → VisualCheck → Finalized`. A failed step
//! records a FAIL entry and jumps straight to `Finalized`; finalization
//! always captures logs, removes the container and yields exactly one
//! [`ContainerReport`].

use std::collections::BTreeMap;
use std::time::Duration;

use tagcheck_common::config::{Distro, HarnessConfig};
use tagcheck_common::constants::ERROR_SENTINEL;
use tagcheck_common::error::{HarnessError, Result};
use tagcheck_common::types::{ContainerReport, FailReason, RunReport, TagTestResult};

use crate::backend::{self, ContainerHandle, ContainerRuntime, ContainerSpec};
use crate::clock::Clock;
use crate::metadata;
use crate::readiness::{Readiness, ReadinessPoller};
use crate::visual::VisualCheck;

/// Check recorded for the readiness wait.
pub const STARTUP_CHECK: &str = "Container startup";
/// Check recorded for the build version label.
pub const BUILD_VERSION_CHECK: &str = "Get build version";
/// Check recorded for the package inventory.
pub const PACKAGE_CHECK: &str = "Dump package info";

/// Lifecycle state of one tag under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagState {
    /// Launching the subject container.
    Starting,
    /// Tailing logs for a readiness marker.
    AwaitingReady,
    /// Reading the build version label.
    ExtractingVersion,
    /// Running the package inventory command.
    DumpingPackages,
    /// Waiting for services inside the container to warm up.
    Settling,
    /// Running the visual verification.
    VisualCheck,
    /// Logs captured, container removed, report emitted.
    Finalized,
}

/// Settings the orchestrator needs from the run configuration.
#[derive(Debug, Clone)]
pub struct TagTestSettings {
    /// Image repository.
    pub image: String,
    /// Distro family selecting the package command.
    pub base: Distro,
    /// Environment of every subject container.
    pub env: BTreeMap<String, String>,
    /// Readiness ceiling.
    pub startup_timeout: Duration,
    /// Settle delay after the package dump.
    pub settle_delay: Duration,
    /// Keep the settle delay when the package dump failed.
    pub settle_on_package_failure: bool,
}

impl From<&HarnessConfig> for TagTestSettings {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            image: config.image.clone(),
            base: config.base,
            env: config.container_env.clone(),
            startup_timeout: Duration::from_secs(config.startup_timeout_secs),
            settle_delay: Duration::from_secs(config.delay_start_secs),
            settle_on_package_failure: config.settle_on_package_failure,
        }
    }
}

/// Checks and values collected for the tag currently under test.
#[derive(Debug)]
pub struct TagAccumulator {
    tag: String,
    tests: Vec<TagTestResult>,
    build_version: String,
    packages: String,
    screenshot: Option<String>,
}

impl TagAccumulator {
    /// Starts an empty accumulator with sentinel metadata.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            tests: Vec::new(),
            build_version: ERROR_SENTINEL.to_string(),
            packages: ERROR_SENTINEL.to_string(),
            screenshot: None,
        }
    }

    /// Appends a check result.
    pub fn record(&mut self, result: TagTestResult) {
        if result.is_pass() {
            tracing::info!(tag = %self.tag, check = %result.check, "PASS");
        } else {
            tracing::warn!(
                tag = %self.tag,
                check = %result.check,
                outcome = %result.outcome,
                detail = %result.detail,
                "FAIL"
            );
        }
        self.tests.push(result);
    }

    /// Checks recorded so far.
    pub fn tests(&self) -> &[TagTestResult] {
        &self.tests
    }

    /// Turns the accumulated state into a report and leaves the accumulator
    /// empty.
    pub fn finalize(&mut self, logs: String, duration: Duration) -> ContainerReport {
        ContainerReport {
            tag: self.tag.clone(),
            logs,
            build_version: std::mem::replace(&mut self.build_version, ERROR_SENTINEL.to_string()),
            packages: std::mem::replace(&mut self.packages, ERROR_SENTINEL.to_string()),
            tag_tests: std::mem::take(&mut self.tests),
            duration_secs: duration.as_secs_f64(),
            screenshot: self.screenshot.take(),
        }
    }
}

/// Scoped ownership of a started container: removed on release or drop,
/// whichever comes first.
struct ContainerLease<'a> {
    runtime: &'a dyn ContainerRuntime,
    handle: Option<ContainerHandle>,
}

impl<'a> ContainerLease<'a> {
    const fn new(runtime: &'a dyn ContainerRuntime, handle: ContainerHandle) -> Self {
        Self {
            runtime,
            handle: Some(handle),
        }
    }

    /// Captures final logs and removes the container.
    fn release(mut self) -> String {
        let Some(handle) = self.handle.take() else {
            return String::new();
        };
        let logs = self.runtime.logs(&handle).unwrap_or_else(|e| {
            tracing::warn!(container = %handle, error = %e, "could not capture final logs");
            String::new()
        });
        backend::remove_quietly(self.runtime, &handle);
        logs
    }
}

impl Drop for ContainerLease<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            backend::remove_quietly(self.runtime, &handle);
        }
    }
}

/// Drives tags through their lifecycle one at a time.
pub struct TagTester<'a> {
    runtime: &'a dyn ContainerRuntime,
    clock: &'a dyn Clock,
    visual: Option<&'a dyn VisualCheck>,
    settings: TagTestSettings,
}

impl<'a> TagTester<'a> {
    /// Creates a tester without visual verification.
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        clock: &'a dyn Clock,
        settings: TagTestSettings,
    ) -> Self {
        Self {
            runtime,
            clock,
            visual: None,
            settings,
        }
    }

    /// Enables the visual verification step.
    #[must_use]
    pub fn with_visual_check(mut self, visual: &'a dyn VisualCheck) -> Self {
        self.visual = Some(visual);
        self
    }

    /// Tests every tag in order and appends one report per tag.
    pub fn run(&self, mut report: RunReport, tags: &[String]) -> RunReport {
        for tag in tags {
            let container = self.test_tag(tag);
            report.push(container);
        }
        report.finish();
        tracing::info!(
            image = %report.image,
            status = %report.status,
            tags = report.containers.len(),
            "run finished"
        );
        report
    }

    /// Runs the full lifecycle of one tag.
    pub fn test_tag(&self, tag: &str) -> ContainerReport {
        let started = self.clock.now();
        let mut acc = TagAccumulator::new(tag);
        tracing::info!(tag, image = %self.settings.image, "starting test");

        let spec = ContainerSpec::new(format!("{}:{tag}", self.settings.image))
            .with_env(self.settings.env.clone());
        let handle = match self.runtime.start(&spec) {
            Ok(handle) => handle,
            Err(e) => {
                acc.record(TagTestResult::fail(
                    STARTUP_CHECK,
                    FailReason::ContainerStartFailed,
                    &e,
                ));
                return acc.finalize(String::new(), self.clock.now() - started);
            }
        };

        tracing::debug!(tag, container = %handle, name = handle.name(), "subject container running");
        let lease = ContainerLease::new(self.runtime, handle.clone());
        let mut state = TagState::AwaitingReady;
        while state != TagState::Finalized {
            let next = self.step(state, &handle, &mut acc);
            tracing::debug!(tag, from = ?state, to = ?next, "transition");
            state = next;
        }
        let logs = lease.release();
        acc.finalize(logs, self.clock.now() - started)
    }

    /// Executes one state and returns the next.
    fn step(&self, state: TagState, handle: &ContainerHandle, acc: &mut TagAccumulator) -> TagState {
        match state {
            TagState::Starting | TagState::Finalized => TagState::Finalized,
            TagState::AwaitingReady => self.await_ready(handle, acc),
            TagState::ExtractingVersion => self.extract_version(handle, acc),
            TagState::DumpingPackages => self.dump_packages(handle, acc),
            TagState::Settling => {
                self.clock.sleep(self.settings.settle_delay);
                if self.visual.is_some() {
                    TagState::VisualCheck
                } else {
                    TagState::Finalized
                }
            }
            TagState::VisualCheck => {
                if let Some(visual) = self.visual {
                    let outcome = visual.verify(handle, &acc.tag);
                    acc.screenshot = outcome.screenshot;
                    acc.record(outcome.result);
                }
                TagState::Finalized
            }
        }
    }

    fn await_ready(&self, handle: &ContainerHandle, acc: &mut TagAccumulator) -> TagState {
        let poller = ReadinessPoller::new(self.runtime, self.clock, self.settings.startup_timeout);
        match poller.wait_ready(handle) {
            Readiness::Ready => {
                acc.record(TagTestResult::pass(STARTUP_CHECK));
                TagState::ExtractingVersion
            }
            Readiness::TimedOut => {
                acc.record(TagTestResult::fail(
                    STARTUP_CHECK,
                    FailReason::InitNotFinished,
                    "INIT NOT FINISHED",
                ));
                TagState::Finalized
            }
            Readiness::PollFailed(message) => {
                acc.record(TagTestResult::fail(
                    STARTUP_CHECK,
                    FailReason::InitNotFinished,
                    message,
                ));
                TagState::Finalized
            }
        }
    }

    fn extract_version(&self, handle: &ContainerHandle, acc: &mut TagAccumulator) -> TagState {
        match metadata::fetch_build_version(self.runtime, handle) {
            Ok(version) => {
                tracing::info!(tag = %acc.tag, %version, "build version");
                acc.build_version = version;
                acc.record(TagTestResult::pass(BUILD_VERSION_CHECK));
                TagState::DumpingPackages
            }
            Err(e) => {
                acc.record(TagTestResult::fail(
                    BUILD_VERSION_CHECK,
                    FailReason::BuildVersionMissing,
                    e,
                ));
                TagState::Finalized
            }
        }
    }

    fn dump_packages(&self, handle: &ContainerHandle, acc: &mut TagAccumulator) -> TagState {
        match metadata::package_inventory(self.runtime, handle, self.settings.base) {
            Ok(packages) => {
                acc.packages = packages;
                acc.record(TagTestResult::pass(PACKAGE_CHECK));
                TagState::Settling
            }
            Err(e) => {
                acc.record(TagTestResult::fail(PACKAGE_CHECK, FailReason::PackageDumpFailed, e));
                if self.settings.settle_on_package_failure {
                    self.clock.sleep(self.settings.settle_delay);
                }
                TagState::Finalized
            }
        }
    }
}

/// Fails the run early when the engine does not answer.
///
/// # Errors
///
/// Returns [`HarnessError::RuntimeUnavailable`] if the engine is unreachable.
pub fn ensure_runtime_available(runtime: &dyn ContainerRuntime) -> Result<()> {
    if runtime.is_available() {
        Ok(())
    } else {
        Err(HarnessError::RuntimeUnavailable {
            message: "the container engine did not answer".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagcheck_common::types::Outcome;

    #[test]
    fn accumulator_starts_with_sentinels() {
        let mut acc = TagAccumulator::new("1.0");
        let report = acc.finalize("logs".into(), Duration::from_secs(2));
        assert_eq!(report.tag, "1.0");
        assert_eq!(report.build_version, "ERROR");
        assert_eq!(report.packages, "ERROR");
        assert!(report.tag_tests.is_empty());
        assert!((report.duration_secs - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn finalize_clears_the_accumulator() {
        let mut acc = TagAccumulator::new("latest");
        acc.build_version = "v1".into();
        acc.record(TagTestResult::pass(STARTUP_CHECK));
        let first = acc.finalize(String::new(), Duration::ZERO);
        assert_eq!(first.tag_tests.len(), 1);
        assert_eq!(first.build_version, "v1");
        assert!(acc.tests().is_empty());
        let second = acc.finalize(String::new(), Duration::ZERO);
        assert!(second.tag_tests.is_empty());
        assert_eq!(second.build_version, "ERROR");
    }

    #[test]
    fn recorded_failures_keep_their_reason() {
        let mut acc = TagAccumulator::new("1.0");
        acc.record(TagTestResult::fail(
            PACKAGE_CHECK,
            FailReason::PackageDumpFailed,
            "apk: not found",
        ));
        assert_eq!(
            acc.tests()[0].outcome,
            Outcome::Fail(FailReason::PackageDumpFailed)
        );
    }
}
