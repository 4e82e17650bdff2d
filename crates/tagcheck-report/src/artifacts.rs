//! Writes the rendered report files into a run directory.

use std::path::{Path, PathBuf};

use tagcheck_common::error::{HarnessError, Result};
use tagcheck_common::types::RunReport;

use crate::render;

/// HTML report file name.
pub const INDEX_FILE: &str = "index.html";
/// JSON report file name.
pub const REPORT_FILE: &str = "report.json";
/// Status badge file name.
pub const BADGE_FILE: &str = "badge.svg";
/// Status marker file name.
pub const STATUS_FILE: &str = "ci-status.yml";

/// Renders the report and writes [`INDEX_FILE`], [`REPORT_FILE`],
/// [`BADGE_FILE`] and [`STATUS_FILE`] into `dir`, creating it if needed.
///
/// Returns the written paths.
///
/// # Errors
///
/// Returns an error if rendering fails or a file cannot be written.
pub fn write_artifacts(report: &RunReport, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).map_err(|e| HarnessError::io(dir, e))?;

    let files = [
        (INDEX_FILE, render::render_html(report)),
        (REPORT_FILE, render::render_json(report)?),
        (BADGE_FILE, render::render_badge(report.status)),
        (STATUS_FILE, render::render_status_marker(report.status)),
    ];

    let mut written = Vec::with_capacity(files.len());
    for (name, contents) in files {
        let path = dir.join(name);
        std::fs::write(&path, contents).map_err(|e| HarnessError::io(&path, e))?;
        tracing::debug!(path = %path.display(), "artifact written");
        written.push(path);
    }
    tracing::info!(dir = %dir.display(), status = %report.status, "report artifacts written");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_all_four_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let run_dir = dir.path().join("linuxserver/nginx/1.0-ls1");
        let mut report = RunReport::new("linuxserver/nginx", "1.0-ls1");
        report.mark_fail();

        let written = write_artifacts(&report, &run_dir).expect("write");

        assert_eq!(written.len(), 4);
        for name in [INDEX_FILE, REPORT_FILE, BADGE_FILE, STATUS_FILE] {
            assert!(run_dir.join(name).is_file(), "{name} missing");
        }
        let marker = std::fs::read_to_string(run_dir.join(STATUS_FILE)).expect("read");
        assert_eq!(marker, "CI: 'FAIL'\n");
    }
}
