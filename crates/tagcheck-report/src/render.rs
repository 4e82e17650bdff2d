//! Rendering of a run report into publishable documents.
//!
//! Every renderer is a pure function of the [`RunReport`]; nothing here
//! touches the filesystem.

use tagcheck_common::error::Result;
use tagcheck_common::types::{ContainerReport, RunReport, RunStatus, TagTestResult};

/// Serializes the report as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`HarnessError::Serialization`](tagcheck_common::error::HarnessError::Serialization)
/// if the report cannot be encoded.
pub fn render_json(report: &RunReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Renders a self-contained HTML page for the report.
#[must_use]
pub fn render_html(report: &RunReport) -> String {
    let title = format!("{}:{}", escape_html(&report.image), escape_html(&report.meta_tag));
    let mut html = String::with_capacity(4096);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{title} test results</title>\n"));
    html.push_str(STYLE);
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!(
        "<h1>{title}</h1>\n<p class=\"status {}\">Overall status: {}</p>\n",
        status_class(report.status),
        report.status
    ));
    html.push_str(&format!(
        "<p class=\"meta\">Started {}",
        escape_html(&report.started_at)
    ));
    if let Some(finished) = &report.finished_at {
        html.push_str(&format!(", finished {}", escape_html(finished)));
    }
    html.push_str("</p>\n");

    for container in &report.containers {
        render_container(&mut html, container);
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn render_container(html: &mut String, container: &ContainerReport) {
    let status = if container.passed() {
        RunStatus::Pass
    } else {
        RunStatus::Fail
    };
    html.push_str(&format!(
        "<section class=\"tag\">\n<h2>{} <span class=\"{}\">{status}</span></h2>\n",
        escape_html(&container.tag),
        status_class(status)
    ));
    html.push_str(&format!(
        "<p>Build version: <code>{}</code> &middot; {:.1}s</p>\n",
        escape_html(&container.build_version),
        container.duration_secs
    ));

    html.push_str("<table>\n<tr><th>Check</th><th>Result</th><th>Detail</th></tr>\n");
    for test in &container.tag_tests {
        render_check(html, test);
    }
    html.push_str("</table>\n");

    if let Some(file) = &container.screenshot {
        let file = escape_html(file);
        html.push_str(&format!(
            "<a href=\"{file}\"><img class=\"shot\" src=\"{file}\" alt=\"screenshot of {}\"></a>\n",
            escape_html(&container.tag)
        ));
    }

    html.push_str(&format!(
        "<details><summary>Packages</summary><pre>{}</pre></details>\n",
        escape_html(&container.packages)
    ));
    html.push_str(&format!(
        "<details><summary>Container logs</summary><pre>{}</pre></details>\n",
        escape_html(&container.logs)
    ));
    html.push_str("</section>\n");
}

fn render_check(html: &mut String, test: &TagTestResult) {
    let class = if test.is_pass() { "pass" } else { "fail" };
    html.push_str(&format!(
        "<tr><td>{}</td><td class=\"{class}\">{}</td><td>{}</td></tr>\n",
        escape_html(&test.check),
        test.outcome,
        escape_html(&test.detail)
    ));
}

const fn status_class(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Pass => "pass",
        RunStatus::Fail => "fail",
    }
}

const STYLE: &str = "<style>\n\
body{font-family:sans-serif;margin:2em;background:#fafafa;color:#222}\n\
table{border-collapse:collapse;margin:.5em 0}\n\
td,th{border:1px solid #ccc;padding:.3em .6em;text-align:left}\n\
.pass{color:#2e7d32;font-weight:bold}\n\
.fail{color:#c62828;font-weight:bold}\n\
.meta{color:#666}\n\
.shot{max-width:640px;border:1px solid #ccc}\n\
pre{max-height:30em;overflow:auto;background:#f0f0f0;padding:.5em}\n\
</style>\n";

/// Renders a shields-style SVG badge reading only the overall status.
#[must_use]
pub fn render_badge(status: RunStatus) -> String {
    let (text, color) = match status {
        RunStatus::Pass => ("PASS", "#4c1"),
        RunStatus::Fail => ("FAIL", "#e05d44"),
    };
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"76\" height=\"20\" role=\"img\" aria-label=\"CI: {text}\">\
<title>CI: {text}</title>\
<rect width=\"27\" height=\"20\" fill=\"#555\"/>\
<rect x=\"27\" width=\"49\" height=\"20\" fill=\"{color}\"/>\
<g fill=\"#fff\" text-anchor=\"middle\" font-family=\"Verdana,Geneva,DejaVu Sans,sans-serif\" font-size=\"11\">\
<text x=\"13.5\" y=\"14\">CI</text>\
<text x=\"51.5\" y=\"14\">{text}</text>\
</g></svg>\n"
    )
}

/// Renders the `ci-status.yml` marker.
#[must_use]
pub fn render_status_marker(status: RunStatus) -> String {
    format!("CI: '{status}'\n")
}

/// Escapes text for inclusion in HTML element content and attribute values.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
