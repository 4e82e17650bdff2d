//! Headless browser control over the W3C WebDriver protocol.

use std::time::Duration;

use base64::Engine as _;
use serde::Deserialize;
use serde_json::{Value, json};
use tagcheck_common::constants::{BROWSER_WINDOW_SIZE, PAGE_LOAD_TIMEOUT_SECS};

use super::{VisualError, VisualFailure};

/// Starts browser sessions.
pub trait BrowserDriver {
    /// Opens a new session.
    ///
    /// # Errors
    ///
    /// Returns a classified error if the browser cannot be started.
    fn launch(&self) -> Result<Box<dyn BrowserSession>, VisualError>;
}

/// One open browser.
pub trait BrowserSession {
    /// Loads `url` and waits for the page load to complete.
    ///
    /// # Errors
    ///
    /// Returns [`VisualFailure::Timeout`] when the page load timeout expires.
    fn navigate(&mut self, url: &str) -> Result<(), VisualError>;

    /// Captures the viewport as PNG bytes.
    ///
    /// # Errors
    ///
    /// Returns a classified error if the capture fails.
    fn screenshot(&mut self) -> Result<Vec<u8>, VisualError>;

    /// Closes the session. Calling it again is a no-op.
    fn quit(&mut self);
}

/// [`BrowserDriver`] talking to a WebDriver server such as `chromedriver`.
#[derive(Debug, Clone)]
pub struct WebDriverClient {
    base_url: String,
    client: reqwest::blocking::Client,
    page_load_timeout: Duration,
}

impl WebDriverClient {
    /// Creates a client for the WebDriver server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self, VisualError> {
        let page_load_timeout = Duration::from_secs(PAGE_LOAD_TIMEOUT_SECS);
        // Leave room for the browser to report its own page-load timeout.
        let client = reqwest::blocking::Client::builder()
            .timeout(page_load_timeout + Duration::from_secs(30))
            .build()
            .map_err(|e| VisualError::new(VisualFailure::Unknown, e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            page_load_timeout,
        })
    }

    /// Capabilities requested for every session.
    fn capabilities(&self) -> Value {
        let (width, height) = BROWSER_WINDOW_SIZE;
        let page_load_ms = u64::try_from(self.page_load_timeout.as_millis()).unwrap_or(u64::MAX);
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": [
                            "--no-sandbox",
                            "--headless",
                            "--disable-gpu",
                            format!("--window-size={width},{height}"),
                        ]
                    },
                    "timeouts": { "pageLoad": page_load_ms }
                }
            }
        })
    }
}

impl BrowserDriver for WebDriverClient {
    fn launch(&self) -> Result<Box<dyn BrowserSession>, VisualError> {
        let url = format!("{}/session", self.base_url);
        let response = self.client.post(&url).json(&self.capabilities()).send();
        let value = read_value(response)?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| VisualError::new(VisualFailure::Unknown, "WebDriver returned no session id"))?
            .to_string();
        tracing::debug!(session = %session_id, "browser session opened");
        Ok(Box::new(WebDriverSession {
            client: self.client.clone(),
            session_url: format!("{}/session/{session_id}", self.base_url),
            open: true,
        }))
    }
}

/// Session on a WebDriver server. Closed on drop if still open.
#[derive(Debug)]
pub struct WebDriverSession {
    client: reqwest::blocking::Client,
    session_url: String,
    open: bool,
}

impl BrowserSession for WebDriverSession {
    fn navigate(&mut self, url: &str) -> Result<(), VisualError> {
        let response = self
            .client
            .post(format!("{}/url", self.session_url))
            .json(&json!({ "url": url }))
            .send();
        let _ = read_value(response)?;
        Ok(())
    }

    fn screenshot(&mut self) -> Result<Vec<u8>, VisualError> {
        let response = self
            .client
            .get(format!("{}/screenshot", self.session_url))
            .send();
        let value = read_value(response)?;
        let encoded = value
            .as_str()
            .ok_or_else(|| VisualError::new(VisualFailure::Unknown, "screenshot payload is not a string"))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| VisualError::new(VisualFailure::Unknown, format!("invalid screenshot encoding: {e}")))
    }

    fn quit(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        match self.client.delete(&self.session_url).send() {
            Ok(_) => tracing::debug!(session = %self.session_url, "browser session closed"),
            Err(e) => tracing::warn!(session = %self.session_url, error = %e, "failed to close browser session"),
        }
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        self.quit();
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    value: Value,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

/// Unwraps the `value` member of a WebDriver reply, turning protocol errors
/// into classified failures.
fn read_value(
    response: reqwest::Result<reqwest::blocking::Response>,
) -> Result<Value, VisualError> {
    let response = response.map_err(|e| VisualError::from_reqwest(&e))?;
    let status = response.status();
    let body: WireResponse = response
        .json()
        .map_err(|e| VisualError::new(VisualFailure::Unknown, format!("malformed WebDriver reply ({status}): {e}")))?;
    if let Ok(err) = serde_json::from_value::<WireError>(body.value.clone()) {
        return Err(classify_wire_error(&err.error, &err.message));
    }
    if !status.is_success() {
        return Err(VisualError::new(
            VisualFailure::Unknown,
            format!("WebDriver answered {status}"),
        ));
    }
    Ok(body.value)
}

/// Maps a WebDriver error code to a failure kind.
fn classify_wire_error(code: &str, message: &str) -> VisualError {
    let kind = match code {
        "timeout" | "script timeout" => VisualFailure::Timeout,
        _ => VisualFailure::Unknown,
    };
    VisualError::new(kind, format!("{code}: {message}"))
}
