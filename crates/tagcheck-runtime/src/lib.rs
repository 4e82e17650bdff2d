//! Per-tag container acceptance testing.
//!
//! The [`orchestrator`] drives each tag through launch, readiness, metadata
//! extraction, package dump, settle delay and the optional [`visual`] check,
//! releasing every container it started on the way out.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod backend;
pub mod clock;
pub mod metadata;
pub mod orchestrator;
pub mod readiness;
pub mod visual;
