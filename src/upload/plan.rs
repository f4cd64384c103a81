// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Deployment planning.
//!
//! Many concrete entries tend to share a destination directory. Planning
//! collects the distinct directories once, so each directory is created and
//! permissioned exactly one time before any file lands in it.

use crate::{perm::Permission, upload::{ConcreteEntry, Source}};

use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

/// Deployment plan of one host.
///
/// # Invariants
///
/// - Every destination directory of every entry is listed exactly once.
/// - Entries keep the order they were resolved in.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Plan {
    directories: BTreeSet<PathBuf>,
    entries: Vec<ConcreteEntry>,
}

impl Plan {
    /// Construct new plan from resolved entries.
    pub fn new(entries: Vec<ConcreteEntry>) -> Self {
        let directories = entries
            .iter()
            .map(|entry| entry.destination.dir.clone())
            .collect();

        Self {
            directories,
            entries,
        }
    }

    /// Distinct destination directories.
    pub fn directories(&self) -> impl Iterator<Item = &Path> {
        self.directories.iter().map(PathBuf::as_path)
    }

    /// Entries in placement order.
    pub fn entries(&self) -> &[ConcreteEntry] {
        self.entries.as_slice()
    }

    /// Check if plan has nothing to do.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ordered steps to perform on the host.
    ///
    /// All directories come first, then each entry is placed and immediately
    /// permissioned. Entries without an effective permission get no
    /// permission step.
    pub fn steps(&self) -> Vec<Step<'_>> {
        let mut steps = self
            .directories()
            .map(|path| Step::EnsureDirectory {
                path,
                mode: Permission::directory_default(),
            })
            .collect::<Vec<_>>();

        for entry in &self.entries {
            let destination = entry.destination.path();
            steps.push(Step::Place {
                entry,
                destination: destination.clone(),
            });

            if let Some(mode) = entry.permission() {
                steps.push(Step::SetPermission {
                    path: destination,
                    mode,
                });
            }
        }

        steps
    }
}

/// Single operation against a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<'a> {
    /// Create directory unless it exists, then apply mode to it.
    EnsureDirectory { path: &'a Path, mode: Permission },

    /// Upload or download file into destination.
    Place {
        entry: &'a ConcreteEntry,
        destination: PathBuf,
    },

    /// Apply mode to placed file.
    SetPermission { path: PathBuf, mode: &'a Permission },
}

impl Display for Step<'_> {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::EnsureDirectory { path, mode } => {
                write!(fmt, "create directory {} ({mode})", path.display())
            }
            Self::Place { entry, destination } => match &entry.source {
                Source::Local(source) => write!(
                    fmt,
                    "upload {} to {}",
                    source.display(),
                    destination.display()
                ),
                Source::Url(url) => write!(fmt, "download {url} to {}", destination.display()),
            },
            Self::SetPermission { path, mode } => {
                write!(fmt, "set permission {mode} on {}", path.display())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::destination::Destination;
    use pretty_assertions::assert_eq;

    fn entry(source: &str, dir: &str, file: &str, captured: Option<u32>) -> ConcreteEntry {
        ConcreteEntry {
            label: source.into(),
            source: Source::Local(source.into()),
            destination: Destination {
                dir: dir.into(),
                file: file.into(),
            },
            declared: None,
            captured: captured.map(Permission::from_bits),
        }
    }

    #[test]
    fn deduplicate_directories() {
        let plan = Plan::new(vec![
            entry("/data/a.conf", "/etc/app", "a.conf", Some(0o644)),
            entry("/data/b.conf", "/etc/app", "b.conf", Some(0o600)),
            entry("/data/sub/c.conf", "/etc/app/sub", "c.conf", None),
        ]);

        let result = plan.directories().collect::<Vec<_>>();
        assert_eq!(result, vec![Path::new("/etc/app"), Path::new("/etc/app/sub")]);
    }

    #[test]
    fn order_steps() {
        let plan = Plan::new(vec![
            entry("/data/b.conf", "/etc/app", "b.conf", Some(0o600)),
            entry("/data/a.conf", "/etc/app", "a.conf", None),
        ]);

        let result = plan
            .steps()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        let expect = vec![
            "create directory /etc/app (0755)",
            "upload /data/b.conf to /etc/app/b.conf",
            "set permission 0600 on /etc/app/b.conf",
            "upload /data/a.conf to /etc/app/a.conf",
        ];

        assert_eq!(result, expect);
    }

    #[test]
    fn declared_permission_wins() -> anyhow::Result<()> {
        let mut entry = entry("/data/a.conf", "/etc/app", "a.conf", Some(0o644));
        entry.declared = Some("0640".parse()?);
        let plan = Plan::new(vec![entry]);

        let steps = plan.steps();
        let result = steps.last().map(ToString::to_string);
        assert_eq!(result.as_deref(), Some("set permission 0640 on /etc/app/a.conf"));

        Ok(())
    }

    #[test]
    fn empty_plan() {
        let plan = Plan::new(vec![]);
        assert!(plan.is_empty());
        assert_eq!(plan.steps(), vec![]);
    }
}
