// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

mod integration;

use anyhow::Result;
use async_trait::async_trait;
use oxidrop::{
    host::{Host, HostError},
    perm::Permission,
};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tempfile::TempDir;

/// Scratch directory tree on the controller.
pub(crate) struct TreeFixture {
    root: TempDir,
}

impl TreeFixture {
    pub(crate) fn new() -> Result<Self> {
        Ok(Self {
            root: tempfile::tempdir()?,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        self.root.path()
    }

    /// Write file at relative path, creating its parents.
    pub(crate) fn write(&self, path: impl AsRef<Path>, contents: &str) -> Result<PathBuf> {
        let path = self.root.path().join(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;

        Ok(path)
    }

    /// Write file at relative path with a mode.
    #[cfg(unix)]
    pub(crate) fn write_with_mode(
        &self,
        path: impl AsRef<Path>,
        contents: &str,
        mode: u32,
    ) -> Result<PathBuf> {
        use std::os::unix::fs::PermissionsExt;

        let path = self.write(path, contents)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(mode))?;

        Ok(path)
    }
}

/// Host that records every call it receives.
#[derive(Default)]
pub(crate) struct RecordingHost {
    existing: HashSet<PathBuf>,
    calls: Mutex<Vec<String>>,
}

impl RecordingHost {
    pub(crate) fn with_existing(paths: &[&str]) -> Self {
        Self {
            existing: paths.iter().map(PathBuf::from).collect(),
            ..Default::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Host for RecordingHost {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn file_exists(&self, path: &Path) -> bool {
        self.existing.contains(path)
    }

    async fn make_directory(&self, path: &Path) -> Result<(), HostError> {
        self.record(format!("mkdir {}", path.display()));
        Ok(())
    }

    async fn set_permission(&self, path: &Path, mode: &Permission) -> Result<(), HostError> {
        self.record(format!("chmod {mode} {}", path.display()));
        Ok(())
    }

    async fn upload_local_file(&self, local: &Path, remote: &Path) -> Result<(), HostError> {
        self.record(format!("upload {} {}", local.display(), remote.display()));
        Ok(())
    }

    async fn download_url(&self, url: &str, remote: &Path) -> Result<(), HostError> {
        self.record(format!("download {url} {}", remote.display()));
        Ok(())
    }
}
