//! # tagcheck-report
//!
//! Consumers of a finished [`RunReport`](tagcheck_common::types::RunReport).
//!
//! Handles:
//! - **Render**: JSON and HTML reports, the status badge, the status marker.
//! - **Artifacts**: writing the rendered files into the run directory.
//! - **Store**: durable storage seam and its filesystem implementation.
//! - **Publish**: mirroring a run directory under its meta tag and `latest`.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod artifacts;
pub mod publish;
pub mod render;
pub mod store;
