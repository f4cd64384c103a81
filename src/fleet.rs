// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Fleet-wide parallel execution.
//!
//! Every host of a fleet gets its own tokio task. Hosts share nothing
//! mutable, so no locking happens between them. A failing host only stops
//! its own pipeline; every other host runs to completion, and all failures
//! are collected into one [`FleetError`].
//!
//! # Cancellation
//!
//! A [`CancelHandle`] signals every host unit at once. Each unit drops its
//! in-flight work at the next suspension point and reports
//! [`DeployError::Cancelled`], leaving that host partially deployed.

use crate::{
    config::{HostSpec, Manifest, UploadFile},
    event::Observer,
    host::Host,
    upload::{deploy::DeployError, upload_files as upload_host_files},
};

use futures::future::join_all;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    future::Future,
    sync::Arc,
};
use tokio::sync::watch;
use tracing::{debug, info, instrument};

/// Construct linked cancellation handle and signal.
pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (sender, receiver) = watch::channel(false);
    (CancelHandle { sender }, Cancellation { receiver })
}

/// Trigger side of cancellation.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancel every unit of work observing the linked [`Cancellation`].
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

/// Observing side of cancellation.
#[derive(Debug, Clone)]
pub struct Cancellation {
    receiver: watch::Receiver<bool>,
}

impl Cancellation {
    /// Signal that never fires.
    pub fn never() -> Self {
        let (_, cancellation) = cancellation();
        cancellation
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until cancellation is requested.
    ///
    /// Pends forever if the handle was dropped without cancelling.
    pub async fn cancelled(&mut self) {
        if self.receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Run closure for every host concurrently.
///
/// Each host comes paired with the work item handed to `run` alongside it.
/// One task is spawned per host. All tasks are awaited, and every failure is
/// collected rather than stopping at the first one.
///
/// # Errors
///
/// - Return [`FleetError`] listing each host whose closure failed, was
///   cancelled, or panicked.
pub async fn for_each_host<H, T, F, Fut>(
    units: Vec<(Arc<H>, T)>,
    cancel: &Cancellation,
    run: F,
) -> Result<(), FleetError>
where
    H: Host + ?Sized + 'static,
    F: Fn(Arc<H>, T) -> Fut,
    Fut: Future<Output = Result<(), DeployError>> + Send + 'static,
{
    let (names, handles): (Vec<_>, Vec<_>) = units
        .into_iter()
        .map(|(host, item)| {
            let name = host.name().to_owned();
            let mut cancel = cancel.clone();
            let work = run(host, item);
            let handle = tokio::spawn(async move {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(DeployError::Cancelled),
                    result = work => result,
                }
            });
            (name, handle)
        })
        .unzip();

    let failures = names
        .into_iter()
        .zip(join_all(handles).await)
        .filter_map(|(host, result)| match result {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(HostFailure { host, error }),
            Err(error) => Some(HostFailure {
                host,
                error: DeployError::Join(error),
            }),
        })
        .collect::<Vec<_>>();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(FleetError { failures })
    }
}

/// Upload declared files to every host of a manifest.
///
/// Hosts without declared files are skipped. Each remaining host is
/// connected through `connect`, then resolved, planned, and deployed on its
/// own task.
///
/// # Errors
///
/// - Return [`FleetError`] if at least one host failed.
#[instrument(skip_all, level = "debug")]
pub async fn upload_files<C>(
    manifest: &Manifest,
    connect: C,
    observer: Arc<dyn Observer>,
    cancel: &Cancellation,
) -> Result<(), FleetError>
where
    C: Fn(&HostSpec) -> Arc<dyn Host>,
{
    let mut units: Vec<(Arc<dyn Host>, Vec<UploadFile>)> = Vec::new();
    for spec in &manifest.hosts {
        if spec.files.is_empty() {
            debug!("{}: no files to upload", spec.name);
            continue;
        }

        units.push((connect(spec), spec.files.clone()));
    }

    if units.is_empty() {
        info!("no hosts have files to upload");
        return Ok(());
    }

    info!("uploading files to {} hosts", units.len());
    for_each_host(units, cancel, move |host, files| {
        let observer = observer.clone();
        async move { upload_host_files(host.as_ref(), files, observer.as_ref()).await }
    })
    .await
}

/// Failure of a single host.
#[derive(Debug, thiserror::Error)]
#[error("{host}: {error}")]
pub struct HostFailure {
    /// Name of failed host.
    pub host: String,

    /// What went wrong.
    #[source]
    pub error: DeployError,
}

/// One or more hosts failed.
#[derive(Debug)]
pub struct FleetError {
    /// Every failed host, in manifest order.
    pub failures: Vec<HostFailure>,
}

impl FleetError {
    /// Names of failed hosts.
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|failure| failure.host.as_str())
    }
}

impl Display for FleetError {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{} of the hosts failed", self.failures.len())?;
        for failure in &self.failures {
            write!(fmt, "\n  {}: {}", failure.host, failure.error)?;
            let mut source = std::error::Error::source(&failure.error);
            while let Some(cause) = source {
                write!(fmt, ": {cause}")?;
                source = cause.source();
            }
        }

        Ok(())
    }
}

impl std::error::Error for FleetError {}
