//! Container runtime gateway.
//!
//! The orchestrator talks to the container engine only through
//! [`ContainerRuntime`], so tests can swap in an in-memory engine.

pub mod docker;

use std::collections::BTreeMap;
use std::fmt;

use tagcheck_common::constants::{APP_NAME, DEFAULT_NETWORK};
use tagcheck_common::error::Result;

/// Everything needed to start a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Unique container name.
    pub name: String,
    /// Image reference, `repository:tag`.
    pub image: String,
    /// Environment variables.
    pub env: BTreeMap<String, String>,
    /// Size of `/dev/shm` in bytes.
    pub shm_size: Option<i64>,
    /// Security options such as `seccomp=unconfined`.
    pub security_opts: Vec<String>,
}

impl ContainerSpec {
    /// Creates a spec for `image` with a generated unique name.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            name: format!("{APP_NAME}-{}", uuid::Uuid::new_v4().simple()),
            image: image.into(),
            env: BTreeMap::new(),
            shm_size: None,
            security_opts: Vec::new(),
        }
    }

    /// Replaces the environment.
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Adds one environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the shared memory size in bytes.
    #[must_use]
    pub fn shm_size(mut self, bytes: i64) -> Self {
        self.shm_size = Some(bytes);
        self
    }

    /// Adds a security option.
    #[must_use]
    pub fn security_opt(mut self, opt: impl Into<String>) -> Self {
        self.security_opts.push(opt.into());
        self
    }
}

/// Reference to a started container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerHandle {
    id: String,
    name: String,
}

impl ContainerHandle {
    /// Creates a handle from the engine's container id and its name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Engine-assigned container id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Container name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.id.get(..12).unwrap_or(&self.id);
        write!(f, "{short}")
    }
}

/// Runtime attributes reported by the engine for a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerAttributes {
    /// Image labels.
    pub labels: BTreeMap<String, String>,
    /// IP address per attached network. Empty addresses are omitted.
    pub networks: BTreeMap<String, String>,
}

impl ContainerAttributes {
    /// Looks up a label.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Address on the default bridge network, or on the first network that
    /// has one.
    pub fn ip_address(&self) -> Option<&str> {
        self.networks
            .get(DEFAULT_NETWORK)
            .or_else(|| self.networks.values().next())
            .map(String::as_str)
            .filter(|ip| !ip.is_empty())
    }
}

/// Output of a command run inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit code returned by the command.
    pub exit_code: i32,
    /// Raw standard output.
    pub stdout: Vec<u8>,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

/// Capability over a container engine.
///
/// Every successful [`start`](ContainerRuntime::start) leaves a live
/// container that the caller must hand back to
/// [`remove`](ContainerRuntime::remove).
pub trait ContainerRuntime: Send + Sync {
    /// Starts a detached container.
    ///
    /// # Errors
    ///
    /// `RuntimeUnavailable` if the engine cannot be reached, `ImageNotFound`
    /// if the reference cannot be resolved, `Engine` otherwise.
    fn start(&self, spec: &ContainerSpec) -> Result<ContainerHandle>;

    /// Returns the container's combined output so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be queried.
    fn logs(&self, handle: &ContainerHandle) -> Result<String>;

    /// Runs `command` inside the container without a shell.
    ///
    /// # Errors
    ///
    /// `ExecFailed` if the command cannot run at all, e.g. the binary is missing.
    fn exec(&self, handle: &ContainerHandle, command: &[String]) -> Result<ExecOutput>;

    /// Returns labels and network addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be inspected.
    fn attributes(&self, handle: &ContainerHandle) -> Result<ContainerAttributes>;

    /// Force-removes the container. Removing a container that is already
    /// gone succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error only if the engine itself fails.
    fn remove(&self, handle: &ContainerHandle) -> Result<()>;

    /// Returns whether the engine answers at all.
    fn is_available(&self) -> bool;
}

/// Connects to the default engine, the local Docker daemon.
///
/// # Errors
///
/// Returns `RuntimeUnavailable` if no engine client can be configured.
pub fn detect_runtime() -> Result<Box<dyn ContainerRuntime>> {
    Ok(Box::new(docker::DockerEngine::connect()?))
}

/// Removes a container, logging instead of propagating failures.
///
/// Teardown must never abort the caller, whichever path it is on.
pub fn remove_quietly(runtime: &dyn ContainerRuntime, handle: &ContainerHandle) {
    match runtime.remove(handle) {
        Ok(()) => tracing::debug!(container = %handle, "container removed"),
        Err(e) => tracing::warn!(container = %handle, error = %e, "container removal failed"),
    }
}
