// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Destination resolution.
//!
//! Manifest authors may declare a destination directory (`dstDir`), a
//! destination file (`dst`), or both. The rules are as follows:
//!
//! | `dstDir` | `dst`       | Result                               |
//! |----------|-------------|--------------------------------------|
//! | set      | set         | both as-is                           |
//! | set      | unset       | directory + base name of the source  |
//! | unset    | full path   | split into directory and file name   |
//! | unset    | bare name   | error, no directory context          |
//! | unset    | unset       | error                                |

use super::ResolveError;

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

/// Fully determined destination of a concrete entry.
///
/// # Invariants
///
/// - Directory is never empty.
/// - File name is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    /// Directory that must exist before the file is placed.
    pub dir: PathBuf,

    /// Name of the file inside the directory.
    pub file: String,
}

impl Destination {
    /// Resolve destination from declared directory and file.
    ///
    /// Empty strings count as undeclared.
    ///
    /// # Errors
    ///
    /// - Return [`ResolveError::NoDestination`] if nothing usable was
    ///   declared.
    /// - Return [`ResolveError::NotAbsolute`] if only a bare file name was
    ///   declared.
    pub fn resolve(
        label: &str,
        dir: Option<&Path>,
        file: Option<&str>,
        source: &str,
    ) -> Result<Self, ResolveError> {
        let dir = dir.filter(|dir| !dir.as_os_str().is_empty());
        let file = file.filter(|file| !file.is_empty());

        match (dir, file) {
            (Some(dir), Some(file)) => Ok(Self {
                dir: dir.to_path_buf(),
                file: file.to_owned(),
            }),
            (Some(dir), None) => {
                let file = base_name(source).ok_or_else(|| ResolveError::NoDestination {
                    entry: label.to_owned(),
                })?;

                Ok(Self {
                    dir: dir.to_path_buf(),
                    file,
                })
            }
            (None, Some(file)) => {
                let path = Path::new(file);
                let parent = path.parent().filter(|dir| !dir.as_os_str().is_empty());
                match (parent, path.file_name()) {
                    (Some(dir), Some(name)) => Ok(Self {
                        dir: dir.to_path_buf(),
                        file: name.to_string_lossy().into_owned(),
                    }),
                    _ => Err(ResolveError::NotAbsolute {
                        entry: label.to_owned(),
                        file: file.to_owned(),
                    }),
                }
            }
            (None, None) => Err(ResolveError::NoDestination {
                entry: label.to_owned(),
            }),
        }
    }

    /// Check that declared directory and file can produce a destination.
    ///
    /// Applies the same rules as [`Destination::resolve`] without needing a
    /// source, so malformed declarations are caught before any source is
    /// looked at.
    ///
    /// # Errors
    ///
    /// - Return [`ResolveError::NoDestination`] if nothing was declared.
    /// - Return [`ResolveError::NotAbsolute`] if only a bare file name was
    ///   declared.
    pub fn check(label: &str, dir: Option<&Path>, file: Option<&str>) -> Result<(), ResolveError> {
        let dir = dir.filter(|dir| !dir.as_os_str().is_empty());
        let file = file.filter(|file| !file.is_empty());

        match (dir, file) {
            (None, None) => Err(ResolveError::NoDestination {
                entry: label.to_owned(),
            }),
            (None, Some(file)) if !has_directory(file) => Err(ResolveError::NotAbsolute {
                entry: label.to_owned(),
                file: file.to_owned(),
            }),
            _ => Ok(()),
        }
    }

    /// Full destination path.
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file)
    }
}

impl Display for Destination {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}", self.path().display())
    }
}

fn has_directory(file: &str) -> bool {
    Path::new(file)
        .parent()
        .is_some_and(|dir| !dir.as_os_str().is_empty())
}

fn base_name(source: &str) -> Option<String> {
    Path::new(source)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}
