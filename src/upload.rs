// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! File upload resolution.
//!
//! An [`UploadFile`] from the manifest describes _what_ should end up on a
//! host, but not exactly _which_ files. Before anything can be placed, every
//! upload file is resolved into one or more [`ConcreteEntry`] instances, each
//! one describing a single physical file with a fully determined source and
//! destination.
//!
//! # Source Kinds
//!
//! The source of an upload file is interpreted in the following order:
//!
//! 1. __URL__: anything containing `://`. Passed through verbatim, the host
//!    fetches it directly. No local filesystem access occurs.
//! 2. __Glob pattern__: anything containing one of `* ? [ ] { }`. Expanded on
//!    the controller.
//! 3. __Directory__: expanded as if `<dir>/**/*` was given, i.e., everything
//!    below the directory.
//! 4. __Regular file__: resolves to itself.
//!
//! # Nested Structure
//!
//! Glob expansion splits a pattern into its leading literal directory, the
//! __glob base__, and the rest. Each match keeps its position relative to the
//! glob base, and that relative directory is appended to the declared
//! destination directory. Thus, a source tree `a/{x,sub/y}` uploaded to
//! `/b` becomes `/b/x` and `/b/sub/y`.
//!
//! # Pipeline
//!
//! Resolution is only the first step. See [`upload_files`] for the complete
//! per-host pipeline: resolve, [`plan`], then [`deploy`].

pub mod deploy;
pub mod destination;
pub mod plan;

use crate::{
    config::UploadFile,
    event::{DeployEvent, Observer},
    host::Host,
    perm::{effective, Permission, PermissionError},
    upload::{
        deploy::{execute, DeployError},
        destination::Destination,
        plan::Plan,
    },
};

use glob::Pattern;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Component, Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Characters that turn a source into a glob pattern.
const GLOB_CHARS: &[char] = &['*', '?', '[', ']', '{', '}'];

/// Where the bytes of a concrete entry come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// File on the controller.
    Local(PathBuf),

    /// URL fetched by the host itself.
    Url(String),
}

impl Source {
    /// Check if source is a URL.
    pub fn is_url(&self) -> bool {
        matches!(self, Self::Url(_))
    }
}

impl Display for Source {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Local(path) => write!(fmt, "{}", path.display()),
            Self::Url(url) => fmt.write_str(url),
        }
    }
}

/// One physical file to place on a host.
///
/// Created during resolution, consumed once by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteEntry {
    /// Label for logging, disambiguated when an upload file expanded to many.
    pub label: String,

    /// Where the file comes from.
    pub source: Source,

    /// Where the file goes.
    pub destination: Destination,

    /// Permission declared in the manifest.
    pub declared: Option<Permission>,

    /// Permission captured from the local source at resolution time.
    pub captured: Option<Permission>,
}

impl ConcreteEntry {
    /// Permission to apply after placement, if any.
    pub fn permission(&self) -> Option<&Permission> {
        effective(self.declared.as_ref(), self.captured.as_ref())
    }
}

impl Display for ConcreteEntry {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.label)
    }
}

/// Resolve upload file into concrete entries.
///
/// # Errors
///
/// - Return [`ResolveError::Permission`] if declared permission is malformed,
///   or a local permission cannot be captured.
/// - Return [`ResolveError::Source`] if a local source cannot be stat'ed.
/// - Return [`ResolveError::Pattern`] or [`ResolveError::Glob`] if glob
///   expansion fails.
/// - Return [`ResolveError::AmbiguousDestination`] if many files match while
///   a single destination file was declared.
/// - Return [`ResolveError::NoDestination`] or [`ResolveError::NotAbsolute`]
///   if a destination cannot be determined.
pub fn resolve(file: &UploadFile) -> Result<Vec<ConcreteEntry>> {
    let declared = file.permission()?;
    Destination::check(
        file.label(),
        file.destination_dir.as_deref(),
        file.destination_file.as_deref(),
    )?;

    if file.is_url() {
        let destination = Destination::resolve(
            file.label(),
            file.destination_dir.as_deref(),
            file.destination_file.as_deref(),
            &file.source,
        )?;

        return Ok(vec![ConcreteEntry {
            label: file.label().to_owned(),
            source: Source::Url(file.source.clone()),
            destination,
            declared,
            captured: None,
        }]);
    }

    if is_glob(&file.source) {
        return expand(file, &file.source, glob_base(&file.source), declared);
    }

    let metadata = std::fs::metadata(&file.source).map_err(|err| ResolveError::Source {
        source: err,
        path: PathBuf::from(&file.source),
    })?;

    if metadata.is_dir() {
        let pattern = Path::new(&Pattern::escape(&file.source))
            .join("**")
            .join("*");
        return expand(
            file,
            &pattern.to_string_lossy(),
            PathBuf::from(&file.source),
            declared,
        );
    }

    let destination = Destination::resolve(
        file.label(),
        file.destination_dir.as_deref(),
        file.destination_file.as_deref(),
        &file.source,
    )?;

    Ok(vec![ConcreteEntry {
        label: file.label().to_owned(),
        source: Source::Local(PathBuf::from(&file.source)),
        destination,
        declared,
        captured: Some(Permission::capture(&file.source)?),
    }])
}

/// Run complete upload pipeline for one host.
///
/// Resolves every upload file on a blocking thread, plans the deployment, and
/// executes the plan against the host. The first failure aborts the
/// remaining work for the host. Nothing is rolled back.
///
/// # Errors
///
/// - Return [`DeployError::Resolve`] if any upload file fails to resolve.
/// - Return any other [`DeployError`] that execution produces.
#[instrument(skip_all, fields(host = host.name()), level = "debug")]
pub async fn upload_files<H>(
    host: &H,
    files: Vec<UploadFile>,
    observer: &dyn Observer,
) -> Result<(), DeployError>
where
    H: Host + ?Sized,
{
    for file in &files {
        observer.notify(&DeployEvent::UploadStarted {
            host: host.name(),
            file,
        });
    }

    let resolved = tokio::task::spawn_blocking(move || {
        files
            .into_iter()
            .map(|file| resolve(&file).map(|entries| (file, entries)))
            .collect::<Result<Vec<_>>>()
    })
    .await??;

    let mut entries = Vec::new();
    for (file, concrete) in resolved {
        if concrete.is_empty() {
            warn!("{}: nothing matched {}", host.name(), file);
        }

        for entry in &concrete {
            observer.notify(&DeployEvent::EntryResolved {
                host: host.name(),
                entry,
            });
        }
        entries.extend(concrete);
    }

    let plan = Plan::new(entries);
    debug!(
        "{}: planned {} directories and {} files",
        host.name(),
        plan.directories().count(),
        plan.entries().len()
    );

    execute(host, &plan, observer).await?;
    observer.notify(&DeployEvent::HostFinished {
        host: host.name(),
        files: plan.entries().len(),
    });

    Ok(())
}

fn expand(
    file: &UploadFile,
    pattern: &str,
    base: PathBuf,
    declared: Option<Permission>,
) -> Result<Vec<ConcreteEntry>> {
    let paths = glob::glob(pattern).map_err(|err| ResolveError::Pattern {
        source: err,
        pattern: pattern.to_owned(),
    })?;

    let mut matches = Vec::new();
    for path in paths {
        let path = path?;
        let metadata = std::fs::metadata(&path).map_err(|err| ResolveError::Source {
            source: err,
            path: path.clone(),
        })?;

        // INVARIANT: Directories are recreated from the relative paths of the files inside.
        if metadata.is_dir() {
            continue;
        }
        matches.push(path);
    }

    let declared_file = file
        .destination_file
        .as_deref()
        .filter(|file| !file.is_empty());
    if matches.len() > 1 && declared_file.is_some() {
        return Err(ResolveError::AmbiguousDestination {
            entry: file.label().to_owned(),
            count: matches.len(),
        });
    }

    let total = matches.len();
    let mut entries = Vec::with_capacity(total);
    for (index, path) in matches.into_iter().enumerate() {
        let label = if total > 1 {
            format!("{}: {} ({} of {})", file.label(), path.display(), index + 1, total)
        } else {
            file.label().to_owned()
        };

        let destination_dir = file
            .destination_dir
            .as_deref()
            .map(|dir| match relative_dir(&base, &path) {
                Some(sub) => dir.join(sub),
                None => dir.to_path_buf(),
            });

        let destination = Destination::resolve(
            &label,
            destination_dir.as_deref(),
            declared_file,
            &path.to_string_lossy(),
        )?;
        let captured = Permission::capture(&path)?;

        entries.push(ConcreteEntry {
            label,
            source: Source::Local(path),
            destination,
            declared: declared.clone(),
            captured: Some(captured),
        });
    }

    Ok(entries)
}

/// Check if string contains glob characters.
pub fn is_glob(value: &str) -> bool {
    value.contains(GLOB_CHARS)
}

/// Leading directory of a pattern that contains no glob characters.
pub fn glob_base(pattern: &str) -> PathBuf {
    let path = Path::new(pattern);
    let mut base = PathBuf::new();
    let mut components = path.components().peekable();

    while let Some(component) = components.next() {
        // INVARIANT: The final component is a file pattern, never part of the base.
        if components.peek().is_none() {
            break;
        }

        if component.as_os_str().to_string_lossy().contains(GLOB_CHARS) {
            break;
        }
        base.push(component);
    }

    base
}

fn relative_dir(base: &Path, path: &Path) -> Option<PathBuf> {
    let parent = normalize(path.parent()?);
    let sub = parent.strip_prefix(normalize(base)).ok()?;
    if sub.as_os_str().is_empty() {
        None
    } else {
        Some(sub.to_path_buf())
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

/// Resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Permission is malformed or cannot be captured.
    #[error(transparent)]
    Permission(#[from] PermissionError),

    /// Local source cannot be stat'ed.
    #[error("failed to stat source {:?}", path.display())]
    Source {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Glob pattern is invalid.
    #[error("invalid glob pattern {pattern:?}")]
    Pattern {
        #[source]
        source: glob::PatternError,
        pattern: String,
    },

    /// Glob match cannot be read.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),

    /// Many files matched but only one destination file was declared.
    #[error("{count} files found for {entry:?} but no destination directory (dstDir) set")]
    AmbiguousDestination { entry: String, count: usize },

    /// Neither destination directory nor destination file was declared.
    #[error("no destination set for {entry:?}")]
    NoDestination { entry: String },

    /// Destination file was declared without a directory component.
    #[error("no destination directory for {entry:?} and {file:?} is not a full path")]
    NotAbsolute { entry: String, file: String },
}

/// Friendly result alias :3
type Result<T, E = ResolveError> = std::result::Result<T, E>;
