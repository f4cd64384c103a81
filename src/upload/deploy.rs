// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Plan execution.
//!
//! Walks the steps of a [`Plan`] against a single [`Host`]. Within one host
//! everything is strictly sequential: directories exist before files land in
//! them, and a file is placed before its permission is applied. The first
//! failing step aborts the rest. Nothing already placed is rolled back.

use crate::{
    event::{DeployEvent, Observer},
    host::{Host, HostError},
    upload::{
        plan::{Plan, Step},
        ResolveError, Source,
    },
};

use std::path::PathBuf;
use tracing::{debug, instrument};

/// Execute deployment plan on host.
///
/// Directories that already exist are left alone, making re-runs cheap.
/// Directories that get created receive the conventional `0755` mode.
///
/// # Errors
///
/// - Return [`DeployError::CreateDirectory`] or
///   [`DeployError::DirectoryPermission`] if a directory cannot be prepared.
/// - Return [`DeployError::Upload`] or [`DeployError::Download`] if a file
///   cannot be placed.
/// - Return [`DeployError::FilePermission`] if a placed file cannot be
///   permissioned.
#[instrument(skip_all, fields(host = host.name()), level = "debug")]
pub async fn execute<H>(host: &H, plan: &Plan, observer: &dyn Observer) -> Result<()>
where
    H: Host + ?Sized,
{
    for step in plan.steps() {
        debug!("{}: {step}", host.name());
        match step {
            Step::EnsureDirectory { path, mode } => {
                if host.file_exists(path).await {
                    observer.notify(&DeployEvent::DirectoryExists {
                        host: host.name(),
                        path,
                    });
                    continue;
                }

                host.make_directory(path)
                    .await
                    .map_err(|err| DeployError::CreateDirectory {
                        source: err,
                        host: host.name().to_owned(),
                        path: path.to_path_buf(),
                    })?;

                host.set_permission(path, &mode).await.map_err(|err| {
                    DeployError::DirectoryPermission {
                        source: err,
                        host: host.name().to_owned(),
                        path: path.to_path_buf(),
                    }
                })?;

                observer.notify(&DeployEvent::DirectoryCreated {
                    host: host.name(),
                    path,
                    mode: &mode,
                });
            }
            Step::Place { entry, destination } => match &entry.source {
                Source::Local(local) => {
                    host.upload_local_file(local, &destination)
                        .await
                        .map_err(|err| DeployError::Upload {
                            source: err,
                            host: host.name().to_owned(),
                            local: local.clone(),
                            destination: destination.clone(),
                        })?;

                    observer.notify(&DeployEvent::FileUploaded {
                        host: host.name(),
                        entry,
                        destination: &destination,
                    });
                }
                Source::Url(url) => {
                    host.download_url(url, &destination)
                        .await
                        .map_err(|err| DeployError::Download {
                            source: err,
                            host: host.name().to_owned(),
                            url: url.clone(),
                            destination: destination.clone(),
                        })?;

                    observer.notify(&DeployEvent::FileDownloaded {
                        host: host.name(),
                        entry,
                        destination: &destination,
                    });
                }
            },
            Step::SetPermission { path, mode } => {
                host.set_permission(&path, mode)
                    .await
                    .map_err(|err| DeployError::FilePermission {
                        source: err,
                        host: host.name().to_owned(),
                        path: path.clone(),
                    })?;

                observer.notify(&DeployEvent::PermissionApplied {
                    host: host.name(),
                    path: &path,
                    mode,
                });
            }
        }
    }

    Ok(())
}

/// Deployment error types.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Upload file could not be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Directory could not be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDirectory {
        #[source]
        source: HostError,
        host: String,
        path: PathBuf,
    },

    /// Directory could not be permissioned.
    #[error("failed to set permissions for directory {:?}", path.display())]
    DirectoryPermission {
        #[source]
        source: HostError,
        host: String,
        path: PathBuf,
    },

    /// Local file could not be uploaded.
    #[error("failed to upload {:?} to {:?}", local.display(), destination.display())]
    Upload {
        #[source]
        source: HostError,
        host: String,
        local: PathBuf,
        destination: PathBuf,
    },

    /// URL could not be downloaded.
    #[error("failed to download {url} to {:?}", destination.display())]
    Download {
        #[source]
        source: HostError,
        host: String,
        url: String,
        destination: PathBuf,
    },

    /// Placed file could not be permissioned.
    #[error("failed to set permissions for file {:?}", path.display())]
    FilePermission {
        #[source]
        source: HostError,
        host: String,
        path: PathBuf,
    },

    /// Deployment was cancelled before it could finish.
    #[error("deployment cancelled")]
    Cancelled,

    /// Blocking or spawned task failed to complete.
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

/// Friendly result alias :3
type Result<T, E = DeployError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        event::NullObserver,
        perm::Permission,
        upload::{destination::Destination, ConcreteEntry},
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::{collections::HashSet, path::Path, sync::Mutex};

    /// Host that records calls and fails on request.
    #[derive(Default)]
    struct FakeHost {
        existing: HashSet<PathBuf>,
        fail_upload: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeHost {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Host for FakeHost {
        fn name(&self) -> &str {
            "fake"
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
            if self.fail_upload {
                return Err(HostError::Syscall {
                    command: "upload".into(),
                    message: "boom".into(),
                });
            }
            self.record(format!("upload {} {}", local.display(), remote.display()));
            Ok(())
        }

        async fn download_url(&self, url: &str, remote: &Path) -> Result<(), HostError> {
            self.record(format!("download {url} {}", remote.display()));
            Ok(())
        }
    }

    fn entry(source: Source, dir: &str, file: &str, captured: Option<u32>) -> ConcreteEntry {
        ConcreteEntry {
            label: source.to_string(),
            source,
            destination: Destination {
                dir: dir.into(),
                file: file.into(),
            },
            declared: None,
            captured: captured.map(Permission::from_bits),
        }
    }

    #[tokio::test]
    async fn execute_in_order() -> anyhow::Result<()> {
        let host = FakeHost::default();
        let mut url = entry(Source::Url("https://example.com/x.bin".into()), "/opt", "x.bin", None);
        url.declared = Some("0755".parse()?);
        let plan = Plan::new(vec![
            entry(Source::Local("/data/a.conf".into()), "/etc/app", "a.conf", Some(0o640)),
            url,
        ]);

        execute(&host, &plan, &NullObserver).await?;

        let expect = vec![
            "mkdir /etc/app",
            "chmod 0755 /etc/app",
            "mkdir /opt",
            "chmod 0755 /opt",
            "upload /data/a.conf /etc/app/a.conf",
            "chmod 0640 /etc/app/a.conf",
            "download https://example.com/x.bin /opt/x.bin",
            "chmod 0755 /opt/x.bin",
        ];
        assert_eq!(host.calls(), expect);

        Ok(())
    }

    #[tokio::test]
    async fn skip_existing_directory() -> anyhow::Result<()> {
        let host = FakeHost {
            existing: HashSet::from([PathBuf::from("/etc/app")]),
            ..Default::default()
        };
        let plan = Plan::new(vec![entry(
            Source::Local("/data/a.conf".into()),
            "/etc/app",
            "a.conf",
            None,
        )]);

        execute(&host, &plan, &NullObserver).await?;
        assert_eq!(host.calls(), vec!["upload /data/a.conf /etc/app/a.conf"]);

        Ok(())
    }

    #[tokio::test]
    async fn abort_on_first_failure() {
        let host = FakeHost {
            fail_upload: true,
            ..Default::default()
        };
        let plan = Plan::new(vec![
            entry(Source::Local("/data/a".into()), "/etc", "a", Some(0o644)),
            entry(Source::Local("/data/b".into()), "/etc", "b", Some(0o644)),
        ]);

        let result = execute(&host, &plan, &NullObserver).await;
        assert!(matches!(result, Err(DeployError::Upload { ref host, .. }) if host == "fake"));
        assert_eq!(host.calls(), vec!["mkdir /etc", "chmod 0755 /etc"]);
    }
}
