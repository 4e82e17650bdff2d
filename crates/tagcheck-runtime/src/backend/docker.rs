//! Docker engine backend speaking the Engine API through `bollard`.
//!
//! The trait is blocking; every call is driven to completion on a private
//! current-thread tokio runtime owned by the backend.

use std::fmt;

use bollard::Docker;
use bollard::errors::Error as DockerError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::{ContainerCreateBody, ContainerInspectResponse, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, LogsOptions,
    RemoveContainerOptions, StartContainerOptions,
};
use futures_util::StreamExt;
use tagcheck_common::error::{HarnessError, Result};
use tokio::runtime::Runtime;

use super::{ContainerAttributes, ContainerHandle, ContainerRuntime, ContainerSpec, ExecOutput};

/// Exit codes an exec reports when the command itself cannot run.
const EXEC_CANNOT_INVOKE: i32 = 126;
const EXEC_NOT_FOUND: i32 = 127;

type ApiResult<T> = std::result::Result<T, DockerError>;

/// Backend connected to the local Docker daemon.
pub struct DockerEngine {
    docker: Docker,
    runtime: Runtime,
}

impl fmt::Debug for DockerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DockerEngine").finish_non_exhaustive()
    }
}

impl DockerEngine {
    /// Connects to the daemon with the platform defaults (`DOCKER_HOST`,
    /// then the local socket). No request is sent until the first call.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeUnavailable` if the client cannot be configured.
    pub fn connect() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| HarnessError::RuntimeUnavailable {
                message: format!("cannot start the engine client runtime: {e}"),
            })?;
        let docker = {
            let _guard = runtime.enter();
            Docker::connect_with_local_defaults().map_err(|e| HarnessError::RuntimeUnavailable {
                message: format!("cannot connect to the Docker daemon: {e}"),
            })?
        };
        Ok(Self { docker, runtime })
    }

    async fn run_exec(&self, id: &str, command: &[String]) -> ApiResult<(i64, Vec<u8>, String)> {
        let options = CreateExecOptions {
            cmd: Some(command.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };
        let created = self.docker.create_exec(id, options).await?;

        let mut stdout = Vec::new();
        let mut stderr = String::new();
        match self.docker.start_exec(&created.id, None).await? {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(chunk) = output.next().await {
                    match chunk? {
                        bollard::container::LogOutput::StdOut { message } => {
                            stdout.extend_from_slice(&message);
                        }
                        bollard::container::LogOutput::StdErr { message } => {
                            stderr.push_str(&String::from_utf8_lossy(&message));
                        }
                        _ => {}
                    }
                }
            }
            StartExecResults::Detached => {
                tracing::warn!(container = id, "exec started detached");
            }
        }

        let inspect = self.docker.inspect_exec(&created.id).await?;
        Ok((inspect.exit_code.unwrap_or(-1), stdout, stderr))
    }
}

/// The engine calls making up a container launch.
trait LaunchSteps {
    /// Creates the container and returns its id.
    fn create(&self, spec: &ContainerSpec) -> ApiResult<String>;
    /// Pulls an image reference.
    fn pull(&self, image: &str) -> ApiResult<()>;
    /// Starts a created container.
    fn start_created(&self, id: &str) -> ApiResult<()>;
    /// Force-removes a container.
    fn discard(&self, id: &str) -> ApiResult<()>;
}

impl LaunchSteps for DockerEngine {
    fn create(&self, spec: &ContainerSpec) -> ApiResult<String> {
        let options = CreateContainerOptions {
            name: Some(spec.name.clone()),
            platform: String::new(),
        };
        let created = self
            .runtime
            .block_on(self.docker.create_container(Some(options), create_body(spec)))?;
        for warning in &created.warnings {
            tracing::warn!(image = %spec.image, %warning, "engine warning on create");
        }
        Ok(created.id)
    }

    fn pull(&self, image: &str) -> ApiResult<()> {
        let options = CreateImageOptions {
            from_image: Some(image.to_string()),
            ..Default::default()
        };
        self.runtime.block_on(async {
            let mut stream = self.docker.create_image(Some(options), None, None);
            while let Some(progress) = stream.next().await {
                if let Some(status) = progress?.status {
                    tracing::debug!(image, %status, "pull progress");
                }
            }
            Ok(())
        })
    }

    fn start_created(&self, id: &str) -> ApiResult<()> {
        self.runtime
            .block_on(self.docker.start_container(id, None::<StartContainerOptions>))
    }

    fn discard(&self, id: &str) -> ApiResult<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self
            .runtime
            .block_on(self.docker.remove_container(id, Some(options)))
        {
            Err(e) if status_of(&e) == Some(404) => Ok(()),
            other => other,
        }
    }
}

impl ContainerRuntime for DockerEngine {
    fn start(&self, spec: &ContainerSpec) -> Result<ContainerHandle> {
        launch(self, spec)
    }

    fn logs(&self, handle: &ContainerHandle) -> Result<String> {
        let options = LogsOptions {
            stdout: true,
            stderr: true,
            tail: "all".to_string(),
            ..Default::default()
        };
        self.runtime.block_on(async {
            let mut stream = self.docker.logs(handle.id(), Some(options));
            let mut text = String::new();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| lookup_error("logs", handle, e))?;
                text.push_str(&chunk.to_string());
            }
            Ok(text)
        })
    }

    fn exec(&self, handle: &ContainerHandle, command: &[String]) -> Result<ExecOutput> {
        let (exit_code, stdout, stderr) = self
            .runtime
            .block_on(self.run_exec(handle.id(), command))
            .map_err(|e| exec_error(command, e))?;
        tracing::debug!(container = %handle, cmd = ?command, exit_code, "exec finished");
        exec_output(command, exit_code, stdout, stderr)
    }

    fn attributes(&self, handle: &ContainerHandle) -> Result<ContainerAttributes> {
        let inspect = self
            .runtime
            .block_on(
                self.docker
                    .inspect_container(handle.id(), None::<InspectContainerOptions>),
            )
            .map_err(|e| lookup_error("inspect", handle, e))?;
        Ok(attributes_from(inspect))
    }

    fn remove(&self, handle: &ContainerHandle) -> Result<()> {
        self.discard(handle.id())
            .map_err(|e| engine_error("remove", e))
    }

    fn is_available(&self) -> bool {
        match self.runtime.block_on(self.docker.ping()) {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error = %e, "Docker daemon did not answer");
                false
            }
        }
    }
}

/// Create, pulling once if the image is missing, then start. A container
/// that was created but failed to start is removed before returning.
fn launch(steps: &impl LaunchSteps, spec: &ContainerSpec) -> Result<ContainerHandle> {
    let id = match steps.create(spec) {
        Ok(id) => id,
        Err(e) if status_of(&e) == Some(404) => {
            tracing::info!(image = %spec.image, "image not present locally, pulling");
            steps.pull(&spec.image).map_err(|e| pull_error(&spec.image, e))?;
            steps.create(spec).map_err(|e| create_error(&spec.image, e))?
        }
        Err(e) => return Err(create_error(&spec.image, e)),
    };

    if let Err(e) = steps.start_created(&id) {
        match steps.discard(&id) {
            Ok(()) => tracing::debug!(container = %id, "removed container that failed to start"),
            Err(rm) => tracing::warn!(container = %id, error = %rm, "could not remove container that failed to start"),
        }
        return Err(engine_error("start", e));
    }

    let handle = ContainerHandle::new(id, spec.name.clone());
    tracing::info!(container = %handle, image = %spec.image, "container started");
    Ok(handle)
}

/// Request body of a container create.
fn create_body(spec: &ContainerSpec) -> ContainerCreateBody {
    let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
    let host_config = HostConfig {
        shm_size: spec.shm_size,
        security_opt: (!spec.security_opts.is_empty()).then(|| spec.security_opts.clone()),
        ..Default::default()
    };
    ContainerCreateBody {
        image: Some(spec.image.clone()),
        env: (!env.is_empty()).then_some(env),
        host_config: Some(host_config),
        ..Default::default()
    }
}

/// Labels and non-empty per-network addresses of an inspected container.
fn attributes_from(inspect: ContainerInspectResponse) -> ContainerAttributes {
    let labels = inspect
        .config
        .and_then(|c| c.labels)
        .unwrap_or_default()
        .into_iter()
        .collect();
    let networks = inspect
        .network_settings
        .and_then(|n| n.networks)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, endpoint)| {
            endpoint
                .ip_address
                .filter(|ip| !ip.is_empty())
                .map(|ip| (name, ip))
        })
        .collect();
    ContainerAttributes { labels, networks }
}

fn exec_output(
    command: &[String],
    exit_code: i64,
    stdout: Vec<u8>,
    stderr: String,
) -> Result<ExecOutput> {
    let exit_code = i32::try_from(exit_code).unwrap_or(-1);
    if exit_code == EXEC_CANNOT_INVOKE || exit_code == EXEC_NOT_FOUND {
        let message = if stderr.trim().is_empty() {
            format!("exit code {exit_code}")
        } else {
            stderr.trim().to_string()
        };
        return Err(HarnessError::ExecFailed {
            command: command.join(" "),
            message,
        });
    }
    Ok(ExecOutput {
        exit_code,
        stdout,
        stderr,
    })
}

/// HTTP status of an Engine API error reply, if the daemon answered.
fn status_of(err: &DockerError) -> Option<u16> {
    match err {
        DockerError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

/// API replies become `Engine`; anything without a reply means the daemon
/// could not be reached.
fn engine_error(operation: &'static str, err: DockerError) -> HarnessError {
    match err {
        DockerError::DockerResponseServerError {
            status_code,
            message,
        } => HarnessError::Engine {
            operation,
            message: format!("{status_code}: {message}"),
        },
        other => HarnessError::RuntimeUnavailable {
            message: format!("{operation}: {other}"),
        },
    }
}

fn create_error(image: &str, err: DockerError) -> HarnessError {
    if status_of(&err) == Some(404) {
        HarnessError::ImageNotFound {
            image: image.to_string(),
        }
    } else {
        engine_error("create", err)
    }
}

/// Registry refusals come back as 4xx replies or, once the pull stream has
/// begun, as stream errors without a status.
fn pull_error(image: &str, err: DockerError) -> HarnessError {
    match status_of(&err) {
        Some(status) if status >= 500 => engine_error("pull", err),
        _ => {
            tracing::warn!(image, error = %err, "pull failed");
            HarnessError::ImageNotFound {
                image: image.to_string(),
            }
        }
    }
}

fn lookup_error(operation: &'static str, handle: &ContainerHandle, err: DockerError) -> HarnessError {
    if status_of(&err) == Some(404) {
        HarnessError::NotFound {
            kind: "container",
            id: handle.id().to_string(),
        }
    } else {
        engine_error(operation, err)
    }
}

/// A missing (404) or stopped (409) container means the command never ran.
fn exec_error(command: &[String], err: DockerError) -> HarnessError {
    match err {
        DockerError::DockerResponseServerError {
            status_code: 404 | 409,
            message,
        } => HarnessError::ExecFailed {
            command: command.join(" "),
            message,
        },
        other => engine_error("exec", other),
    }
}
