//! System-wide constants and defaults.

/// Log lines that signal a container's init system finished starting services.
pub const READY_MARKERS: &[&str] = &["[services.d] done.", "[ls.io-init] done."];

/// Interval between two readiness polls, in seconds.
pub const READY_POLL_INTERVAL_SECS: u64 = 1;

/// Default readiness ceiling, in seconds.
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 300;

/// Default post-start settle delay, in seconds.
pub const DEFAULT_DELAY_START_SECS: u64 = 5;

/// Default settle delay of the visual verification helper, in seconds.
pub const DEFAULT_SCREENSHOT_DELAY_SECS: u64 = 30;

/// Label carrying the image's build version.
pub const BUILD_VERSION_LABEL: &str = "build_version";

/// Sentinel substituted for a value that could not be obtained.
pub const ERROR_SENTINEL: &str = "ERROR";

/// Network whose address is preferred when resolving a container's IP.
pub const DEFAULT_NETWORK: &str = "bridge";

/// Default image of the browser helper container.
pub const DEFAULT_HELPER_IMAGE: &str = "ghcr.io/linuxserver/tester:latest";

/// Port the helper container serves its control endpoint on.
pub const HELPER_PORT: u16 = 3000;

/// Shared memory size in bytes given to the helper container.
pub const HELPER_SHM_SIZE_BYTES: i64 = 1 << 30;

/// Default WebDriver endpoint of the headless browser.
pub const DEFAULT_WEBDRIVER_URL: &str = "http://127.0.0.1:9515";

/// Maximum number of reachability attempts against the helper.
pub const PROBE_MAX_ATTEMPTS: u32 = 10;

/// Base delay of the reachability backoff, in seconds.
pub const PROBE_BACKOFF_BASE_SECS: u64 = 2;

/// Upper bound of a single reachability backoff delay, in seconds.
pub const PROBE_BACKOFF_MAX_SECS: u64 = 120;

/// Status codes that are worth another reachability attempt.
pub const PROBE_RETRY_STATUSES: &[u16] = &[502, 503, 504];

/// Page load timeout applied to the browser, in seconds.
pub const PAGE_LOAD_TIMEOUT_SECS: u64 = 60;

/// Browser viewport.
pub const BROWSER_WINDOW_SIZE: (u32, u32) = (1920, 1080);

/// File name of the debug log written next to the artifacts.
pub const DEBUG_LOG_FILE: &str = "ci.log";

/// Storage prefix segment mirrored with the newest run.
pub const LATEST_PREFIX: &str = "latest";

/// Application name used in container names and output.
pub const APP_NAME: &str = "tagcheck";
