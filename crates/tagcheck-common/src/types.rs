//! Report model shared by the orchestrator and the reporting collaborators.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Overall verdict of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    /// Every check of every tag passed.
    Pass,
    /// At least one check failed.
    Fail,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

/// Why a check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailReason {
    /// The engine refused to start the subject container.
    ContainerStartFailed,
    /// No readiness marker appeared before the deadline.
    InitNotFinished,
    /// The build version label is absent or unreadable.
    BuildVersionMissing,
    /// The package inventory command failed.
    PackageDumpFailed,
    /// The helper container never became reachable.
    ConnectionError,
    /// The helper or the browser timed out.
    Timeout,
    /// Any other visual verification failure.
    Unknown,
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::ContainerStartFailed => "CONTAINER START FAILED",
            Self::InitNotFinished => "INIT NOT FINISHED",
            Self::BuildVersionMissing => "BUILD VERSION MISSING",
            Self::PackageDumpFailed => "PACKAGE DUMP FAILED",
            Self::ConnectionError => "CONNECTION ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(text)
    }
}

/// Result of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "UPPERCASE")]
pub enum Outcome {
    /// The check passed.
    Pass,
    /// The check failed for the given reason.
    Fail(FailReason),
}

impl Outcome {
    /// Returns `true` for [`Outcome::Pass`].
    pub const fn is_pass(self) -> bool {
        matches!(self, Self::Pass)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail(reason) => write!(f, "FAIL {reason}"),
        }
    }
}

/// One named check recorded for a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagTestResult {
    /// Human-readable check name, e.g. `Container startup`.
    pub check: String,
    /// Verdict of the check.
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Free-form detail; `-` when there is nothing to add.
    pub detail: String,
}

impl TagTestResult {
    /// Creates a passing entry without detail.
    pub fn pass(check: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            outcome: Outcome::Pass,
            detail: "-".to_string(),
        }
    }

    /// Creates a failing entry.
    pub fn fail(check: impl Into<String>, reason: FailReason, detail: impl fmt::Display) -> Self {
        Self {
            check: check.into(),
            outcome: Outcome::Fail(reason),
            detail: detail.to_string(),
        }
    }

    /// Returns `true` if the check passed.
    pub const fn is_pass(&self) -> bool {
        self.outcome.is_pass()
    }
}

/// Everything recorded for one tested tag.
///
/// Built once when the tag is finalized and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerReport {
    /// Tag that was tested.
    pub tag: String,
    /// Container logs captured at teardown.
    pub logs: String,
    /// Build version label, or the error sentinel.
    pub build_version: String,
    /// Package inventory, or the error sentinel.
    pub packages: String,
    /// Checks in the order they ran.
    pub tag_tests: Vec<TagTestResult>,
    /// Wall-clock duration of the tag's lifecycle in seconds.
    pub duration_secs: f64,
    /// File name of the captured screenshot, if any.
    pub screenshot: Option<String>,
}

impl ContainerReport {
    /// Returns `true` if every check of this tag passed.
    pub fn passed(&self) -> bool {
        self.tag_tests.iter().all(TagTestResult::is_pass)
    }
}

/// Run-wide report handed to the rendering and publishing collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Image repository under test.
    pub image: String,
    /// Key the run is published under.
    pub meta_tag: String,
    /// Overall verdict; only ever downgraded.
    pub status: RunStatus,
    /// One entry per requested tag, in request order.
    pub containers: Vec<ContainerReport>,
    /// RFC 3339 timestamp of the run start.
    pub started_at: String,
    /// RFC 3339 timestamp of the run end, once finished.
    pub finished_at: Option<String>,
}

impl RunReport {
    /// Creates an empty, passing report.
    pub fn new(image: impl Into<String>, meta_tag: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            meta_tag: meta_tag.into(),
            status: RunStatus::Pass,
            containers: Vec::new(),
            started_at: chrono::Utc::now().to_rfc3339(),
            finished_at: None,
        }
    }

    /// Appends a finalized tag report, downgrading the status if any of its
    /// checks failed.
    pub fn push(&mut self, container: ContainerReport) {
        if !container.passed() {
            self.mark_fail();
        }
        self.containers.push(container);
    }

    /// Downgrades the overall status to [`RunStatus::Fail`].
    pub fn mark_fail(&mut self) {
        self.status = RunStatus::Fail;
    }

    /// Returns `true` while no check has failed.
    pub fn is_pass(&self) -> bool {
        self.status == RunStatus::Pass
    }

    /// Stamps the finish time.
    pub fn finish(&mut self) {
        self.finished_at = Some(chrono::Utc::now().to_rfc3339());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(tag: &str, tests: Vec<TagTestResult>) -> ContainerReport {
        ContainerReport {
            tag: tag.into(),
            logs: String::new(),
            build_version: "1.0-ls1".into(),
            packages: String::new(),
            tag_tests: tests,
            duration_secs: 0.0,
            screenshot: None,
        }
    }

    #[test]
    fn outcome_display_includes_reason() {
        assert_eq!(Outcome::Pass.to_string(), "PASS");
        assert_eq!(
            Outcome::Fail(FailReason::InitNotFinished).to_string(),
            "FAIL INIT NOT FINISHED"
        );
    }

    #[test]
    fn report_stays_pass_with_passing_tags() {
        let mut report = RunReport::new("linuxserver/nginx", "1.0-ls1");
        report.push(container("1.0", vec![TagTestResult::pass("Container startup")]));
        assert!(report.is_pass());
    }

    #[test]
    fn failing_tag_downgrades_and_later_pass_does_not_upgrade() {
        let mut report = RunReport::new("linuxserver/nginx", "1.0-ls1");
        report.push(container(
            "1.0",
            vec![TagTestResult::fail(
                "Container startup",
                FailReason::InitNotFinished,
                "INIT NOT FINISHED",
            )],
        ));
        report.push(container("latest", vec![TagTestResult::pass("Container startup")]));
        assert_eq!(report.status, RunStatus::Fail);
        assert_eq!(report.containers.len(), 2);
    }

    #[test]
    fn test_result_serializes_flat_status() {
        let entry = TagTestResult::fail("Get screenshot", FailReason::Timeout, "page load");
        let json = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(json["status"], "FAIL");
        assert_eq!(json["reason"], "TIMEOUT");
        assert_eq!(json["check"], "Get screenshot");
    }
}
