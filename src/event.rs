// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Deployment events.
//!
//! The upload pipeline reports what it does through [`DeployEvent`]s handed
//! to an [`Observer`]. What happens with them, logging, progress bars,
//! nothing at all, is decided by whoever drives the deployment.

use crate::{config::UploadFile, perm::Permission, upload::ConcreteEntry};

use std::path::Path;
use tracing::info;

/// Something noteworthy happened on a host.
#[derive(Debug, Clone, Copy)]
pub enum DeployEvent<'a> {
    /// Upload file is about to be resolved.
    UploadStarted { host: &'a str, file: &'a UploadFile },

    /// Upload file produced a concrete entry.
    EntryResolved {
        host: &'a str,
        entry: &'a ConcreteEntry,
    },

    /// Destination directory was already there.
    DirectoryExists { host: &'a str, path: &'a Path },

    /// Destination directory was created and permissioned.
    DirectoryCreated {
        host: &'a str,
        path: &'a Path,
        mode: &'a Permission,
    },

    /// Local file was uploaded.
    FileUploaded {
        host: &'a str,
        entry: &'a ConcreteEntry,
        destination: &'a Path,
    },

    /// URL was downloaded by the host.
    FileDownloaded {
        host: &'a str,
        entry: &'a ConcreteEntry,
        destination: &'a Path,
    },

    /// Permission was applied to a placed file.
    PermissionApplied {
        host: &'a str,
        path: &'a Path,
        mode: &'a Permission,
    },

    /// Every file of the host is in place.
    HostFinished { host: &'a str, files: usize },
}

impl DeployEvent<'_> {
    /// Name of host the event happened on.
    pub fn host(&self) -> &str {
        match self {
            Self::UploadStarted { host, .. }
            | Self::EntryResolved { host, .. }
            | Self::DirectoryExists { host, .. }
            | Self::DirectoryCreated { host, .. }
            | Self::FileUploaded { host, .. }
            | Self::FileDownloaded { host, .. }
            | Self::PermissionApplied { host, .. }
            | Self::HostFinished { host, .. } => *host,
        }
    }
}

/// Consumer of deployment events.
///
/// Observers are shared between every concurrently deployed host.
pub trait Observer: Send + Sync {
    fn notify(&self, event: &DeployEvent<'_>);
}

/// Observer that turns events into log records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn notify(&self, event: &DeployEvent<'_>) {
        match event {
            DeployEvent::UploadStarted { host, file } => {
                info!(host, "starting upload of {file}");
            }
            DeployEvent::EntryResolved { host, entry } => {
                info!(host, destination = %entry.destination, "resolved {entry}");
            }
            DeployEvent::DirectoryExists { host, path } => {
                info!(host, "directory {} already exists", path.display());
            }
            DeployEvent::DirectoryCreated { host, path, mode } => {
                info!(host, %mode, "created directory {}", path.display());
            }
            DeployEvent::FileUploaded {
                host,
                entry,
                destination,
            } => {
                info!(host, "uploaded {entry} to {}", destination.display());
            }
            DeployEvent::FileDownloaded {
                host,
                entry,
                destination,
            } => {
                info!(host, "downloaded {entry} to {}", destination.display());
            }
            DeployEvent::PermissionApplied { host, path, mode } => {
                info!(host, %mode, "set permissions for {}", path.display());
            }
            DeployEvent::HostFinished { host, files } => {
                info!(host, files, "all files in place");
            }
        }
    }
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn notify(&self, _event: &DeployEvent<'_>) {}
}
