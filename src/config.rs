// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the fleet manifest that oxidrop consumes to simplify
//! the process of serialization and deserialization. File I/O is left to the
//! caller to figure out.

use crate::{
    perm::{PermMode, Permission, PermissionError},
    upload::{destination::Destination, ResolveError},
};

use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Fleet manifest layout.
///
/// A __manifest__ lists every host of the fleet along with the files that
/// should be placed on it.
///
/// # General Layout
///
/// ```toml
/// [[host]]
/// name = "web-1"
/// root = "/srv/sandbox/web-1"
///
/// [[host.file]]
/// name = "app config"
/// src = "~/app/*.conf"
/// dstDir = "/etc/app"
/// perm = "0644"
/// ```
///
/// Source and destination paths go through shell expansion. Permissions are
/// validated while parsing, so a manifest that parses is free of malformed
/// permission values.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Manifest {
    /// Hosts of the fleet.
    #[serde(rename = "host", default)]
    pub hosts: Vec<HostSpec>,
}

impl Manifest {
    /// Find host by name.
    pub fn host(&self, name: impl AsRef<str>) -> Option<&HostSpec> {
        self.hosts.iter().find(|host| host.name == name.as_ref())
    }
}

impl FromStr for Manifest {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut manifest: Manifest = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        let mut seen = HashSet::new();
        for host in &mut manifest.hosts {
            if !seen.insert(host.name.clone()) {
                return Err(ConfigError::DuplicateHost(host.name.clone()));
            }

            if let Some(root) = &host.root {
                host.root = Some(expand_path(root)?);
            }

            for file in &mut host.files {
                file.expand()?;
                file.validate(&host.name)?;
            }
        }

        Ok(manifest)
    }
}

impl Display for Manifest {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Host entry of the manifest.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct HostSpec {
    /// Unique name of the host.
    pub name: String,

    /// Directory that the host's filesystem is rooted at.
    ///
    /// Only meaningful for local connections, see [`LocalHost`].
    ///
    /// [`LocalHost`]: crate::host::LocalHost
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Files to place on the host.
    #[serde(rename = "file", default)]
    pub files: Vec<UploadFile>,
}

/// File to be uploaded to a host.
///
/// One upload file may expand into many concrete files if its source is a
/// directory or a glob pattern.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct UploadFile {
    /// Human readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Local path, glob pattern, or URL.
    #[serde(rename = "src")]
    pub source: String,

    /// Destination directory.
    #[serde(rename = "dstDir", default, skip_serializing_if = "Option::is_none")]
    pub destination_dir: Option<PathBuf>,

    /// Destination file name, or full destination path.
    #[serde(rename = "dst", default, skip_serializing_if = "Option::is_none")]
    pub destination_file: Option<String>,

    /// Octal permission to apply after placement.
    #[serde(rename = "perm", default, skip_serializing_if = "Option::is_none")]
    pub perm: Option<PermMode>,
}

impl UploadFile {
    /// Construct new upload file from source.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    /// Set destination directory.
    pub fn with_destination_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.destination_dir = Some(dir.into());
        self
    }

    /// Set destination file.
    pub fn with_destination_file(mut self, file: impl Into<String>) -> Self {
        self.destination_file = Some(file.into());
        self
    }

    /// Set declared permission.
    pub fn with_perm(mut self, perm: PermMode) -> Self {
        self.perm = Some(perm);
        self
    }

    /// Set label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Label to identify the file by, falls back to source.
    pub fn label(&self) -> &str {
        match &self.name {
            Some(name) if !name.is_empty() => name.as_str(),
            _ => self.source.as_str(),
        }
    }

    /// Check if source is a URL.
    pub fn is_url(&self) -> bool {
        self.source.contains("://")
    }

    /// Declared permission.
    ///
    /// # Errors
    ///
    /// - Return [`PermissionError`] if declared permission is malformed.
    pub fn permission(&self) -> Result<Option<Permission>, PermissionError> {
        match &self.perm {
            Some(mode) => Permission::parse(mode),
            None => Ok(None),
        }
    }

    fn expand(&mut self) -> Result<()> {
        // INVARIANT: URLs are passed through untouched.
        if !self.is_url() {
            self.source = shellexpand::full(self.source.as_str())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned();
        }

        if let Some(dir) = &self.destination_dir {
            self.destination_dir = Some(expand_path(dir)?);
        }

        if let Some(file) = &self.destination_file {
            self.destination_file = Some(
                shellexpand::full(file.as_str())
                    .map_err(ConfigError::ShellExpansion)?
                    .into_owned(),
            );
        }

        Ok(())
    }

    fn validate(&self, host: &str) -> Result<()> {
        if self.source.is_empty() {
            return Err(ConfigError::MissingSource {
                host: host.to_owned(),
            });
        }

        self.permission().map_err(|err| ConfigError::Permission {
            source: err,
            host: host.to_owned(),
            entry: self.label().to_owned(),
        })?;

        Destination::check(
            self.label(),
            self.destination_dir.as_deref(),
            self.destination_file.as_deref(),
        )
        .map_err(|err| match err {
            ResolveError::NotAbsolute { entry, file } => ConfigError::BareDestination {
                host: host.to_owned(),
                entry,
                file,
            },
            _ => ConfigError::NoDestination {
                host: host.to_owned(),
                entry: self.label().to_owned(),
            },
        })
    }
}

impl Display for UploadFile {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.label())
    }
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Host is listed more than once.
    #[error("host {0:?} is listed more than once")]
    DuplicateHost(String),

    /// Upload file has no source.
    #[error("upload file of host {host:?} has an empty source (src)")]
    MissingSource { host: String },

    /// Upload file declares neither destination directory nor file.
    #[error("upload file {entry:?} of host {host:?} has no destination (dstDir or dst)")]
    NoDestination { host: String, entry: String },

    /// Upload file declares a bare destination file without a directory.
    #[error(
        "upload file {entry:?} of host {host:?} has no destination directory (dstDir) \
        and destination {file:?} is not a full path"
    )]
    BareDestination {
        host: String,
        entry: String,
        file: String,
    },

    /// Upload file declares a malformed permission.
    #[error("invalid permission for {entry:?} of host {host:?}")]
    Permission {
        #[source]
        source: PermissionError,
        host: String,
        entry: String,
    },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
