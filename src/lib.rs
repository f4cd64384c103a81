// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Place files across a fleet of hosts.
//!
//! Oxidrop reads a declarative __manifest__ that lists, for every host, which
//! files should end up where. A single manifest entry may stand for a single
//! file, a whole directory tree, a glob pattern, or a URL. Oxidrop expands
//! each entry into concrete files, figures out their destinations and
//! permissions, and places them on every host concurrently.
//!
//! # Pipeline
//!
//! 1. [`upload::resolve`]: expand manifest entries into concrete entries.
//! 2. [`upload::destination`]: determine destination of each concrete entry.
//! 3. [`upload::plan`]: collect distinct directories and order operations.
//! 4. [`upload::deploy`]: perform operations against a [`host::Host`].
//! 5. [`fleet`]: do all of the above for every host in parallel.
//!
//! Each run unconditionally re-applies everything. There is no rollback, no
//! retry, and no skipping of files that are already up to date.

pub mod config;
pub mod event;
pub mod fleet;
pub mod host;
pub mod path;
pub mod perm;
pub mod upload;

pub use config::{HostSpec, Manifest, UploadFile};
pub use event::{DeployEvent, NullObserver, Observer, TracingObserver};
pub use fleet::{cancellation, for_each_host, CancelHandle, Cancellation, FleetError};
pub use host::{Host, LocalHost};
pub use perm::{PermMode, Permission};
pub use upload::{deploy::DeployError, plan::Plan, resolve, ConcreteEntry, ResolveError};
