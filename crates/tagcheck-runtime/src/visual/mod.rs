//! Visual verification through a disposable browser helper container.
//!
//! The helper is started with the subject's endpoint as its only input and
//! exposes a control page on [`HELPER_PORT`]. Once that page answers, a
//! headless browser loads it and the rendered result is saved as a PNG.
//! The helper is removed on every path, after the browser session is closed.

pub mod probe;
pub mod webdriver;

use std::path::{Path, PathBuf};
use std::time::Duration;

use tagcheck_common::config::WebEndpointConfig;
use tagcheck_common::constants::{HELPER_PORT, HELPER_SHM_SIZE_BYTES};
use tagcheck_common::types::{FailReason, TagTestResult};
use thiserror::Error;

use crate::backend::{self, ContainerHandle, ContainerRuntime, ContainerSpec};
use crate::clock::Clock;

use self::probe::Reachability;
use self::webdriver::{BrowserDriver, BrowserSession};

/// Name of the check recorded by the visual verification.
pub const SCREENSHOT_CHECK: &str = "Get screenshot";

/// Failure classes of the visual verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualFailure {
    /// The helper or the browser could not be reached.
    ConnectionError,
    /// A request or the page load timed out.
    Timeout,
    /// Anything else.
    Unknown,
}

impl From<VisualFailure> for FailReason {
    fn from(kind: VisualFailure) -> Self {
        match kind {
            VisualFailure::ConnectionError => Self::ConnectionError,
            VisualFailure::Timeout => Self::Timeout,
            VisualFailure::Unknown => Self::Unknown,
        }
    }
}

/// A classified visual verification failure.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct VisualError {
    /// Failure class.
    pub kind: VisualFailure,
    /// Human-readable description.
    pub message: String,
}

impl VisualError {
    /// Creates an error of the given class.
    pub fn new(kind: VisualFailure, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classifies a transport error.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            VisualFailure::Timeout
        } else if err.is_connect() {
            VisualFailure::ConnectionError
        } else {
            VisualFailure::Unknown
        };
        Self::new(kind, err.to_string())
    }
}

/// Result of a visual check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualOutcome {
    /// Entry to append to the tag's checks.
    pub result: TagTestResult,
    /// File name of the saved screenshot.
    pub screenshot: Option<String>,
}

impl VisualOutcome {
    fn failed(err: &VisualError) -> Self {
        Self {
            result: TagTestResult::fail(SCREENSHOT_CHECK, err.kind.into(), &err.message),
            screenshot: None,
        }
    }
}

/// Strategy the orchestrator delegates the visual step to.
pub trait VisualCheck {
    /// Verifies the subject container visually. Never fails: problems are
    /// reported in the returned outcome.
    fn verify(&self, subject: &ContainerHandle, tag: &str) -> VisualOutcome;
}

/// Screenshot capture through a helper container and a headless browser.
pub struct ScreenshotVerifier<'a> {
    runtime: &'a dyn ContainerRuntime,
    clock: &'a dyn Clock,
    probe: Box<dyn Reachability + 'a>,
    browser: Box<dyn BrowserDriver + 'a>,
    web: WebEndpointConfig,
    helper_image: String,
    settle: Duration,
    output_dir: PathBuf,
}

impl<'a> ScreenshotVerifier<'a> {
    /// Creates a verifier writing `{tag}.png` files into `output_dir`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        clock: &'a dyn Clock,
        probe: Box<dyn Reachability + 'a>,
        browser: Box<dyn BrowserDriver + 'a>,
        web: WebEndpointConfig,
        helper_image: impl Into<String>,
        settle: Duration,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runtime,
            clock,
            probe,
            browser,
            web,
            helper_image: helper_image.into(),
            settle,
            output_dir: output_dir.into(),
        }
    }

    fn subject_endpoint(&self, subject: &ContainerHandle) -> Result<String, VisualError> {
        let attrs = self
            .runtime
            .attributes(subject)
            .map_err(|e| VisualError::new(VisualFailure::Unknown, e.to_string()))?;
        let ip = attrs.ip_address().ok_or_else(|| {
            VisualError::new(VisualFailure::Unknown, "subject container has no IP address")
        })?;
        Ok(self.web.url_for(ip))
    }

    /// Everything between helper start and helper removal.
    fn drive_helper(&self, helper: &ContainerHandle, tag: &str) -> Result<String, VisualError> {
        let attrs = self
            .runtime
            .attributes(helper)
            .map_err(|e| VisualError::new(VisualFailure::Unknown, e.to_string()))?;
        let ip = attrs.ip_address().ok_or_else(|| {
            VisualError::new(VisualFailure::Unknown, "helper container has no IP address")
        })?;
        let control = format!("http://{ip}:{HELPER_PORT}");

        self.clock.sleep(self.settle);
        self.probe.probe(&control)?;

        let mut session = self.browser.launch()?;
        let captured = self.capture(session.as_mut(), &control);
        session.quit();
        let png = captured?;

        let file_name = format!("{tag}.png");
        save_png(&self.output_dir.join(&file_name), &png)?;
        Ok(file_name)
    }

    fn capture(&self, session: &mut dyn BrowserSession, url: &str) -> Result<Vec<u8>, VisualError> {
        session.navigate(url)?;
        self.clock.sleep(self.settle);
        session.screenshot()
    }
}

impl VisualCheck for ScreenshotVerifier<'_> {
    fn verify(&self, subject: &ContainerHandle, tag: &str) -> VisualOutcome {
        let endpoint = match self.subject_endpoint(subject) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                tracing::warn!(tag, error = %e, "cannot address subject container");
                return VisualOutcome::failed(&e);
            }
        };

        let spec = ContainerSpec::new(self.helper_image.clone())
            .env("URL", endpoint)
            .shm_size(HELPER_SHM_SIZE_BYTES)
            .security_opt("seccomp=unconfined");
        let helper = match self.runtime.start(&spec) {
            Ok(helper) => helper,
            Err(e) => {
                tracing::warn!(tag, error = %e, "helper container failed to start");
                return VisualOutcome::failed(&VisualError::new(
                    VisualFailure::Unknown,
                    e.to_string(),
                ));
            }
        };

        let result = self.drive_helper(&helper, tag);
        backend::remove_quietly(self.runtime, &helper);

        match result {
            Ok(file_name) => {
                tracing::info!(tag, file = %file_name, "screenshot captured");
                VisualOutcome {
                    result: TagTestResult::pass(SCREENSHOT_CHECK),
                    screenshot: Some(file_name),
                }
            }
            Err(e) => {
                tracing::warn!(tag, kind = ?e.kind, error = %e, "screenshot failed");
                VisualOutcome::failed(&e)
            }
        }
    }
}

fn save_png(path: &Path, png: &[u8]) -> Result<(), VisualError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            VisualError::new(VisualFailure::Unknown, format!("{}: {e}", parent.display()))
        })?;
    }
    std::fs::write(path, png)
        .map_err(|e| VisualError::new(VisualFailure::Unknown, format!("{}: {e}", path.display())))
}
