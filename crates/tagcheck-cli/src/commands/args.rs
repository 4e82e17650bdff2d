//! Run configuration flags, each with an environment fallback.

use std::path::PathBuf;

use clap::{ArgAction, Args};
use tagcheck_common::config::{
    Distro, HarnessConfig, ScreenshotConfig, StorageConfig, WebEndpointConfig, parse_env_pairs,
    parse_tags,
};
use tagcheck_common::constants::{
    DEFAULT_DELAY_START_SECS, DEFAULT_HELPER_IMAGE, DEFAULT_SCREENSHOT_DELAY_SECS,
    DEFAULT_STARTUP_TIMEOUT_SECS, DEFAULT_WEBDRIVER_URL,
};
use tagcheck_common::error::Result;

/// Flags describing one test run.
#[derive(Args, Debug, Clone)]
pub struct HarnessArgs {
    /// Image repository, e.g. `linuxserver/nginx`.
    #[arg(long, env = "IMAGE")]
    pub image: String,

    /// Distro family of the image: alpine, debian, ubuntu, fedora or arch.
    #[arg(long, env = "BASE")]
    pub base: String,

    /// Tags to test, separated by `|`.
    #[arg(long, env = "TAGS")]
    pub tags: String,

    /// Key the report is published under.
    #[arg(long, env = "META_TAG")]
    pub meta_tag: String,

    /// Container environment overrides, `KEY=VALUE` pairs separated by `|`.
    #[arg(long, env = "DOCKER_ENV", default_value = "")]
    pub docker_env: String,

    /// Capture a screenshot of each tag's web interface.
    #[arg(long, env = "WEB_SCREENSHOT")]
    pub web_screenshot: bool,

    /// Credentials embedded in the web endpoint URL; empty for none.
    #[arg(long, env = "WEB_AUTH", default_value = "user:password", hide_env_values = true)]
    pub web_auth: String,

    /// Path appended to the web endpoint URL.
    #[arg(long, env = "WEB_PATH", default_value = "")]
    pub web_path: String,

    /// Port of the web interface inside the container.
    #[arg(long, env = "PORT", default_value_t = 80)]
    pub port: u16,

    /// Use https for the web endpoint.
    #[arg(long, env = "SSL")]
    pub ssl: bool,

    /// Seconds to let the helper and the page settle before capturing.
    #[arg(long, env = "SCREENSHOT_DELAY", default_value_t = DEFAULT_SCREENSHOT_DELAY_SECS)]
    pub screenshot_delay: u64,

    /// Seconds to wait after init before inspecting a container.
    #[arg(long, env = "DELAY_START", default_value_t = DEFAULT_DELAY_START_SECS)]
    pub delay_start: u64,

    /// Seconds to wait for the init-complete markers.
    #[arg(long, env = "STARTUP_TIMEOUT", default_value_t = DEFAULT_STARTUP_TIMEOUT_SECS)]
    pub startup_timeout: u64,

    /// Keep the settle delay when the package dump fails.
    #[arg(
        long,
        env = "SETTLE_ON_PACKAGE_FAILURE",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub settle_on_package_failure: bool,

    /// Image of the screenshot helper container.
    #[arg(long, env = "HELPER_IMAGE", default_value = DEFAULT_HELPER_IMAGE)]
    pub helper_image: String,

    /// WebDriver endpoint of the headless browser.
    #[arg(long, env = "WEBDRIVER_URL", default_value = DEFAULT_WEBDRIVER_URL)]
    pub webdriver_url: String,

    /// Root directory for run artifacts.
    #[arg(long, env = "OUTPUT_DIR", default_value = "./output")]
    pub output_dir: PathBuf,

    /// Root directory of the durable artifact mirror.
    #[arg(long, env = "PUBLISH_DIR", default_value = "./published")]
    pub publish_dir: PathBuf,

    /// Storage region.
    #[arg(long, env = "S3_REGION", default_value = "us-east-1")]
    pub s3_region: String,

    /// Storage bucket.
    #[arg(long, env = "S3_BUCKET", default_value = "ci-tests")]
    pub s3_bucket: String,

    /// Storage access key.
    #[arg(long, env = "ACCESS_KEY", default_value = "", hide_env_values = true)]
    pub access_key: String,

    /// Storage secret key.
    #[arg(long, env = "SECRET_KEY", default_value = "", hide_env_values = true)]
    pub secret_key: String,
}

impl HarnessArgs {
    /// Builds and validates the run configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown distro family, malformed
    /// environment overrides, or any value rejected by
    /// [`HarnessConfig::validate`].
    pub fn into_config(self) -> Result<HarnessConfig> {
        let base: Distro = self.base.parse()?;
        let mut config = HarnessConfig::new(self.image, base, parse_tags(&self.tags), self.meta_tag);
        config.container_env = parse_env_pairs(&self.docker_env)?;
        config.web = WebEndpointConfig {
            auth: self.web_auth,
            path: self.web_path,
            port: self.port,
            ssl: self.ssl,
        };
        config.screenshot = ScreenshotConfig {
            enabled: self.web_screenshot,
            delay_secs: self.screenshot_delay,
            helper_image: self.helper_image,
            webdriver_url: self.webdriver_url,
        };
        config.delay_start_secs = self.delay_start;
        config.startup_timeout_secs = self.startup_timeout;
        config.settle_on_package_failure = self.settle_on_package_failure;
        config.output_dir = self.output_dir;
        config.storage = StorageConfig {
            publish_dir: self.publish_dir,
            region: self.s3_region,
            bucket: self.s3_bucket,
            access_key: self.access_key,
            secret_key: self.secret_key,
        };
        config.validate()?;
        Ok(config)
    }
}
