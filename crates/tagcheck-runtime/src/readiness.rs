//! Log-based readiness detection.
//!
//! A container's boot time is unbounded and its log stream is the only
//! observable signal, so the poller tails the logs at a fixed interval until
//! a marker shows up or the ceiling is reached.

use std::time::Duration;

use tagcheck_common::constants::{READY_MARKERS, READY_POLL_INTERVAL_SECS};

use crate::backend::{ContainerHandle, ContainerRuntime};
use crate::clock::Clock;

/// Result of waiting for a container to become ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// A marker was found in the logs.
    Ready,
    /// The deadline elapsed without any marker.
    TimedOut,
    /// Fetching the logs failed; polling stopped early.
    PollFailed(String),
}

impl Readiness {
    /// Collapses the result to the found / not-found contract.
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Polls a container's logs for readiness markers.
pub struct ReadinessPoller<'a> {
    runtime: &'a dyn ContainerRuntime,
    clock: &'a dyn Clock,
    markers: Vec<String>,
    interval: Duration,
    timeout: Duration,
}

impl<'a> ReadinessPoller<'a> {
    /// Creates a poller with the default markers and a 1 s interval.
    pub fn new(runtime: &'a dyn ContainerRuntime, clock: &'a dyn Clock, timeout: Duration) -> Self {
        Self {
            runtime,
            clock,
            markers: READY_MARKERS.iter().map(|m| (*m).to_string()).collect(),
            interval: Duration::from_secs(READY_POLL_INTERVAL_SECS),
            timeout,
        }
    }

    /// Replaces the marker set.
    #[must_use]
    pub fn with_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.markers = markers.into_iter().map(Into::into).collect();
        self
    }

    /// Waits until any marker appears, the deadline passes, or a poll fails.
    pub fn wait_ready(&self, handle: &ContainerHandle) -> Readiness {
        let deadline = self.clock.now() + self.timeout;
        let mut polls = 0_u32;

        while self.clock.now() < deadline {
            polls += 1;
            match self.runtime.logs(handle) {
                Ok(blob) => {
                    if let Some(marker) = self.find_marker(&blob) {
                        tracing::debug!(container = %handle, marker, polls, "readiness marker found");
                        return Readiness::Ready;
                    }
                }
                Err(e) => {
                    tracing::warn!(container = %handle, error = %e, polls, "log poll failed");
                    return Readiness::PollFailed(e.to_string());
                }
            }
            self.clock.sleep(self.interval);
        }

        tracing::warn!(
            container = %handle,
            timeout_secs = self.timeout.as_secs(),
            polls,
            "no readiness marker before deadline"
        );
        Readiness::TimedOut
    }

    fn find_marker(&self, blob: &str) -> Option<&str> {
        self.markers
            .iter()
            .find(|m| blob.contains(m.as_str()))
            .map(String::as_str)
    }
}
