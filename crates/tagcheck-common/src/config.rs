//! Run configuration model.
//!
//! Values are gathered by the CLI (flags with environment fallbacks) and
//! validated here once, before any container is started.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// Base distribution family of the image under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distro {
    /// Alpine Linux (`apk`).
    Alpine,
    /// Debian (`apt`).
    Debian,
    /// Ubuntu (`apt`).
    Ubuntu,
    /// Fedora (`rpm`).
    Fedora,
    /// Arch Linux (`pacman`).
    Arch,
}

impl FromStr for Distro {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alpine" => Ok(Self::Alpine),
            "debian" => Ok(Self::Debian),
            "ubuntu" => Ok(Self::Ubuntu),
            "fedora" => Ok(Self::Fedora),
            "arch" => Ok(Self::Arch),
            other => Err(HarnessError::config(format!(
                "unsupported base distro '{other}' (expected alpine, debian, ubuntu, fedora or arch)"
            ))),
        }
    }
}

impl fmt::Display for Distro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Alpine => "alpine",
            Self::Debian => "debian",
            Self::Ubuntu => "ubuntu",
            Self::Fedora => "fedora",
            Self::Arch => "arch",
        };
        f.write_str(name)
    }
}

/// How the subject container's web endpoint is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebEndpointConfig {
    /// `user:password` embedded in the URL; empty for none.
    pub auth: String,
    /// Path appended after the port, e.g. `/admin`.
    pub path: String,
    /// Port the subject serves on.
    pub port: u16,
    /// Use `https` instead of `http`.
    pub ssl: bool,
}

impl WebEndpointConfig {
    /// Assembles the endpoint URL for a subject reachable at `host`.
    pub fn url_for(&self, host: &str) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        let auth = if self.auth.is_empty() {
            String::new()
        } else {
            format!("{}@", self.auth)
        };
        format!("{scheme}://{auth}{host}:{}{}", self.port, self.path)
    }
}

impl Default for WebEndpointConfig {
    fn default() -> Self {
        Self {
            auth: "user:password".to_string(),
            path: String::new(),
            port: 80,
            ssl: false,
        }
    }
}

/// Visual verification settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotConfig {
    /// Whether the visual check runs at all.
    pub enabled: bool,
    /// Settle delay before probing the helper and before capturing, in seconds.
    pub delay_secs: u64,
    /// Image of the browser helper container.
    pub helper_image: String,
    /// WebDriver endpoint of the headless browser.
    pub webdriver_url: String,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            delay_secs: crate::constants::DEFAULT_SCREENSHOT_DELAY_SECS,
            helper_image: crate::constants::DEFAULT_HELPER_IMAGE.to_string(),
            webdriver_url: crate::constants::DEFAULT_WEBDRIVER_URL.to_string(),
        }
    }
}

/// Durable storage the artifacts are published to.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Filesystem root the artifact mirror is written under.
    pub publish_dir: PathBuf,
    /// Storage region.
    pub region: String,
    /// Storage bucket.
    pub bucket: String,
    /// Access key; never logged.
    pub access_key: String,
    /// Secret key; never logged.
    pub secret_key: String,
}

impl StorageConfig {
    /// Returns the credential strings that must never appear in logs.
    pub fn secrets(&self) -> Vec<String> {
        [&self.access_key, &self.secret_key]
            .into_iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect()
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("publish_dir", &self.publish_dir)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key", &"(removed)")
            .field("secret_key", &"(removed)")
            .finish()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            publish_dir: PathBuf::from("published"),
            region: "us-east-1".to_string(),
            bucket: "ci-tests".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
        }
    }
}

/// Root configuration of one run. Immutable once validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Image repository under test.
    pub image: String,
    /// Base distribution family; selects the package command.
    pub base: Distro,
    /// Tags to test, in order. Duplicates are tested twice.
    pub tags: Vec<String>,
    /// Key the run is published under.
    pub meta_tag: String,
    /// Environment passed to every subject container.
    pub container_env: BTreeMap<String, String>,
    /// Subject web endpoint settings.
    pub web: WebEndpointConfig,
    /// Visual verification settings.
    pub screenshot: ScreenshotConfig,
    /// Settle delay after the package dump, in seconds.
    pub delay_start_secs: u64,
    /// Readiness ceiling, in seconds.
    pub startup_timeout_secs: u64,
    /// Keep the settle delay on the package-dump failure path.
    pub settle_on_package_failure: bool,
    /// Root directory for run artifacts.
    pub output_dir: PathBuf,
    /// Publishing target.
    pub storage: StorageConfig,
}

impl HarnessConfig {
    /// Creates a configuration with defaults for everything but the
    /// required settings.
    pub fn new(
        image: impl Into<String>,
        base: Distro,
        tags: Vec<String>,
        meta_tag: impl Into<String>,
    ) -> Self {
        Self {
            image: image.into(),
            base,
            tags,
            meta_tag: meta_tag.into(),
            container_env: BTreeMap::new(),
            web: WebEndpointConfig::default(),
            screenshot: ScreenshotConfig::default(),
            delay_start_secs: crate::constants::DEFAULT_DELAY_START_SECS,
            startup_timeout_secs: crate::constants::DEFAULT_STARTUP_TIMEOUT_SECS,
            settle_on_package_failure: true,
            output_dir: PathBuf::from("output"),
            storage: StorageConfig::default(),
        }
    }

    /// Checks that every required setting is present and well formed.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.image.trim().is_empty() {
            return Err(HarnessError::config("IMAGE is not set"));
        }
        if self.meta_tag.trim().is_empty() {
            return Err(HarnessError::config("META_TAG is not set"));
        }
        if self.tags.is_empty() || self.tags.iter().any(|t| t.trim().is_empty()) {
            return Err(HarnessError::config("TAGS must list at least one non-empty tag"));
        }
        if self.web.port == 0 {
            return Err(HarnessError::config("PORT must be between 1 and 65535"));
        }
        if self.startup_timeout_secs == 0 {
            return Err(HarnessError::config("STARTUP_TIMEOUT must be positive"));
        }
        if let Some(key) = self.container_env.keys().find(|k| k.is_empty() || k.contains('=')) {
            return Err(HarnessError::config(format!(
                "invalid container environment key '{key}'"
            )));
        }
        Ok(())
    }

    /// Directory holding this run's artifacts: `{output_dir}/{image}/{meta_tag}`.
    pub fn run_dir(&self) -> PathBuf {
        self.output_dir.join(&self.image).join(&self.meta_tag)
    }

    /// Returns a copy safe to print: credentials are masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for secret in [&mut copy.storage.access_key, &mut copy.storage.secret_key] {
            if !secret.is_empty() {
                *secret = "(removed)".to_string();
            }
        }
        copy
    }
}

/// Splits a `|`-separated tag list, keeping order and duplicates.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses `KEY=VALUE|KEY2=VALUE2` into an environment map.
///
/// # Errors
///
/// Returns [`HarnessError::Config`] if a pair has no `=` or an empty key.
pub fn parse_env_pairs(raw: &str) -> Result<BTreeMap<String, String>> {
    let mut env = BTreeMap::new();
    for pair in raw.split('|').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(HarnessError::config(format!(
                "container environment entry '{pair}' is not KEY=VALUE"
            )));
        };
        if key.trim().is_empty() {
            return Err(HarnessError::config(format!(
                "container environment entry '{pair}' has an empty key"
            )));
        }
        let _ = env.insert(key.trim().to_string(), value.to_string());
    }
    Ok(env)
}
