//! Build metadata and package inventory extraction.

use tagcheck_common::config::Distro;
use tagcheck_common::constants::BUILD_VERSION_LABEL;
use thiserror::Error;

use crate::backend::{ContainerAttributes, ContainerHandle, ContainerRuntime};

/// Why metadata could not be collected.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The container could not be inspected.
    #[error("failed to read container attributes: {0}")]
    Attributes(String),

    /// The build version label is absent.
    #[error("label '{0}' is missing")]
    MissingLabel(&'static str),

    /// The build version label is present but blank.
    #[error("label '{0}' is empty")]
    EmptyLabel(&'static str),

    /// The inventory command could not run.
    #[error("{0}")]
    Exec(String),

    /// The inventory command ran but reported failure.
    #[error("`{command}` exited with {exit_code}: {stderr}")]
    NonZeroExit {
        /// Command line that ran.
        command: String,
        /// Exit code it returned.
        exit_code: i32,
        /// Its standard error.
        stderr: String,
    },

    /// The inventory output is not valid UTF-8.
    #[error("package output is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Package manager command listing installed packages for a distro family.
pub fn package_command(distro: Distro) -> Vec<String> {
    let cmd: &[&str] = match distro {
        Distro::Alpine => &["apk", "info", "-v"],
        Distro::Debian | Distro::Ubuntu => &["apt", "list"],
        Distro::Fedora => &["rpm", "-qa"],
        Distro::Arch => &["pacman", "-Q"],
    };
    cmd.iter().map(|s| (*s).to_string()).collect()
}

/// Reads the build version label from container attributes.
///
/// # Errors
///
/// Returns an error if the label is missing or blank.
pub fn build_version(attrs: &ContainerAttributes) -> Result<String, MetadataError> {
    let value = attrs
        .label(BUILD_VERSION_LABEL)
        .ok_or(MetadataError::MissingLabel(BUILD_VERSION_LABEL))?;
    if value.trim().is_empty() {
        return Err(MetadataError::EmptyLabel(BUILD_VERSION_LABEL));
    }
    Ok(value.to_string())
}

/// Inspects the container and reads its build version.
///
/// # Errors
///
/// Returns an error if inspection fails or the label is unusable.
pub fn fetch_build_version(
    runtime: &dyn ContainerRuntime,
    handle: &ContainerHandle,
) -> Result<String, MetadataError> {
    let attrs = runtime
        .attributes(handle)
        .map_err(|e| MetadataError::Attributes(e.to_string()))?;
    build_version(&attrs)
}

/// Lists the installed packages of a running container.
///
/// # Errors
///
/// Returns an error if the command cannot run, exits non-zero, or prints
/// something that is not UTF-8.
pub fn package_inventory(
    runtime: &dyn ContainerRuntime,
    handle: &ContainerHandle,
    distro: Distro,
) -> Result<String, MetadataError> {
    let command = package_command(distro);
    tracing::debug!(container = %handle, %distro, cmd = ?command, "dumping package inventory");

    let output = runtime
        .exec(handle, &command)
        .map_err(|e| MetadataError::Exec(e.to_string()))?;
    if output.exit_code != 0 {
        return Err(MetadataError::NonZeroExit {
            command: command.join(" "),
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(String::from_utf8(output.stdout)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_commands_per_family() {
        assert_eq!(package_command(Distro::Alpine), vec!["apk", "info", "-v"]);
        assert_eq!(package_command(Distro::Debian), vec!["apt", "list"]);
        assert_eq!(package_command(Distro::Ubuntu), vec!["apt", "list"]);
        assert_eq!(package_command(Distro::Fedora), vec!["rpm", "-qa"]);
        assert_eq!(package_command(Distro::Arch), vec!["pacman", "-Q"]);
    }

    #[test]
    fn build_version_reads_label() {
        let mut attrs = ContainerAttributes::default();
        let _ = attrs
            .labels
            .insert("build_version".into(), "version:- 1.2.3-ls4".into());
        assert_eq!(build_version(&attrs).unwrap(), "version:- 1.2.3-ls4");
    }

    #[test]
    fn build_version_missing_or_blank_is_error() {
        let mut attrs = ContainerAttributes::default();
        assert!(matches!(
            build_version(&attrs),
            Err(MetadataError::MissingLabel("build_version"))
        ));
        let _ = attrs.labels.insert("build_version".into(), "  ".into());
        assert!(matches!(build_version(&attrs), Err(MetadataError::EmptyLabel(_))));
    }
}
