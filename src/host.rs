// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Host capabilities.
//!
//! Oxidrop never talks to a machine directly. Everything it needs from a host
//! is expressed through the [`Host`] trait: check for a path, create a
//! directory, change a mode, receive a local file, and fetch a URL. How those
//! operations reach the machine is up to the implementation.
//!
//! This crate ships [`LocalHost`], which performs every operation on the
//! controller itself, optionally re-rooted under a directory. Remote
//! connections can be plugged in by implementing [`Host`].

use crate::perm::Permission;

use async_trait::async_trait;
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Operations a host must support to receive files.
#[async_trait]
pub trait Host: Send + Sync {
    /// Name of the host for logging and error reporting.
    fn name(&self) -> &str;

    /// Check if path exists on host.
    async fn file_exists(&self, path: &Path) -> bool;

    /// Create directory on host, including missing parents.
    async fn make_directory(&self, path: &Path) -> Result<()>;

    /// Apply octal mode to path on host.
    async fn set_permission(&self, path: &Path, mode: &Permission) -> Result<()>;

    /// Copy file from controller to host.
    async fn upload_local_file(&self, local: &Path, remote: &Path) -> Result<()>;

    /// Make host fetch URL into path.
    async fn download_url(&self, url: &str, remote: &Path) -> Result<()>;
}

/// Host backed by the controller's own filesystem.
///
/// All host paths are interpreted relative to an optional root directory.
/// Thus, `/etc/app` on a local host rooted at `/srv/web-1` ends up at
/// `/srv/web-1/etc/app`.
#[derive(Debug, Clone)]
pub struct LocalHost {
    name: String,
    root: Option<PathBuf>,
}

impl LocalHost {
    /// Construct new local host operating on real paths.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: None,
        }
    }

    /// Construct new local host rooted at a directory.
    pub fn with_root(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: Some(root.into()),
        }
    }

    /// Map host path onto controller path.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) => root.join(path.strip_prefix("/").unwrap_or(path)),
            None => path.to_path_buf(),
        }
    }

    async fn ensure_parent(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                make_dirs(parent.to_path_buf()).await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Host for LocalHost {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    async fn file_exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(self.resolve_path(path))
            .await
            .unwrap_or(false)
    }

    #[instrument(skip(self), level = "debug")]
    async fn make_directory(&self, path: &Path) -> Result<()> {
        make_dirs(self.resolve_path(path)).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn set_permission(&self, path: &Path, mode: &Permission) -> Result<()> {
        let resolved = self.resolve_path(path);
        set_mode(&resolved, mode).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn upload_local_file(&self, local: &Path, remote: &Path) -> Result<()> {
        let resolved = self.resolve_path(remote);
        self.ensure_parent(&resolved).await?;

        let bytes = tokio::fs::copy(local, &resolved)
            .await
            .map_err(|err| HostError::Io {
                source: err,
                action: "copy file to",
                path: resolved.clone(),
            })?;
        debug!("copied {bytes} bytes to {}", resolved.display());

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn download_url(&self, url: &str, remote: &Path) -> Result<()> {
        let resolved = self.resolve_path(remote);
        self.ensure_parent(&resolved).await?;

        let output = syscall_non_interactive(
            "curl",
            [
                OsStr::new("-fsSL"),
                OsStr::new("-o"),
                resolved.as_os_str(),
                OsStr::new(url),
            ],
        )
        .await?;

        if !output.is_empty() {
            debug!("{output}");
        }

        Ok(())
    }
}

async fn make_dirs(path: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        mkdirp::mkdirp(&path).map_err(|err| HostError::Io {
            source: err,
            action: "create directory",
            path,
        })
    })
    .await??;

    Ok(())
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: &Permission) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode.mode()))
        .await
        .map_err(|err| HostError::Io {
            source: err,
            action: "set permissions on",
            path: path.to_path_buf(),
        })
}

#[cfg(not(unix))]
async fn set_mode(path: &Path, mode: &Permission) -> Result<()> {
    debug!("ignoring permission {mode} for {}", path.display());
    Ok(())
}

async fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    let output = Command::new(cmd.as_ref())
        .args(args)
        .output()
        .await
        .map_err(|err| HostError::Spawn {
            source: err,
            command: cmd.as_ref().to_string_lossy().into_owned(),
        })?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
    let mut message = String::new();

    if !stdout.is_empty() {
        message.push_str(format!("stdout: {stdout}").as_str());
    }

    if !stderr.is_empty() {
        message.push_str(format!("stderr: {stderr}").as_str());
    }

    // INVARIANT: Chomp trailing newlines.
    let message = message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message);

    if !output.status.success() {
        return Err(HostError::Syscall {
            command: cmd.as_ref().to_string_lossy().into_owned(),
            message,
        });
    }

    Ok(message)
}

/// Host operation error types.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Filesystem operation failed.
    #[error("failed to {action} {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        action: &'static str,
        path: PathBuf,
    },

    /// External command could not be started.
    #[error("failed to run command {command:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        command: String,
    },

    /// External command exited unsuccessfully.
    #[error("command {command:?} failed:\n{message}")]
    Syscall { command: String, message: String },

    /// Blocking task failed to complete.
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

/// Friendly result alias :3
pub type Result<T, E = HostError> = std::result::Result<T, E>;
