// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use oxidrop::{
    cancellation,
    config::{HostSpec, Manifest},
    event::{DeployEvent, Observer, TracingObserver},
    fleet,
    host::{Host, LocalHost},
    path::default_manifest_path,
    upload::{plan::Plan, resolve},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::{path::PathBuf, process::exit, sync::Arc};
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "oxidrop [options] <oxidrop-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        match self.command {
            Command::Deploy(opts) => run_deploy(opts).await,
            Command::Plan(opts) => run_plan(opts),
            Command::Check(opts) => run_check(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Upload files of manifest to every host concurrently.
    #[command(override_usage = "oxidrop deploy [options]")]
    Deploy(DeployOptions),

    /// Show ordered operations for each host without performing them.
    #[command(override_usage = "oxidrop plan [options]")]
    Plan(PlanOptions),

    /// Validate manifest and print it in canonical form.
    #[command(override_usage = "oxidrop check [options]")]
    Check(CheckOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DeployOptions {
    /// Path to fleet manifest.
    #[arg(short, long, value_name = "path")]
    pub manifest: Option<PathBuf>,

    /// Only deploy to given hosts.
    #[arg(long = "host", value_name = "host_name")]
    pub hosts: Vec<String>,

    /// Show progress bar instead of per-file log lines.
    #[arg(short, long)]
    pub progress: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PlanOptions {
    /// Path to fleet manifest.
    #[arg(short, long, value_name = "path")]
    pub manifest: Option<PathBuf>,

    /// Only plan for given hosts.
    #[arg(long = "host", value_name = "host_name")]
    pub hosts: Vec<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CheckOptions {
    /// Path to fleet manifest.
    #[arg(short, long, value_name = "path")]
    pub manifest: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

async fn run_deploy(opts: DeployOptions) -> Result<()> {
    let manifest = select_hosts(load_manifest(opts.manifest)?, &opts.hosts)?;

    let (handle, cancel) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling deployment");
            handle.cancel();
        }
    });

    let progress = if opts.progress {
        Some(Arc::new(ProgressObserver::new()?))
    } else {
        None
    };
    let observer: Arc<dyn Observer> = match &progress {
        Some(progress) => progress.clone(),
        None => Arc::new(TracingObserver),
    };

    let result = fleet::upload_files(&manifest, connect, observer, &cancel).await;
    if let Some(progress) = progress {
        progress.finish(result.is_ok());
    }
    result?;

    Ok(())
}

fn run_plan(opts: PlanOptions) -> Result<()> {
    let manifest = select_hosts(load_manifest(opts.manifest)?, &opts.hosts)?;
    for spec in manifest.hosts.iter().filter(|spec| !spec.files.is_empty()) {
        let mut entries = Vec::new();
        for file in &spec.files {
            entries.extend(resolve(file).with_context(|| format!("{}: {file}", spec.name))?);
        }

        println!("{}:", spec.name);
        for (index, step) in Plan::new(entries).steps().iter().enumerate() {
            println!("  {}. {step}", index + 1);
        }
    }

    Ok(())
}

fn run_check(opts: CheckOptions) -> Result<()> {
    let manifest = load_manifest(opts.manifest)?;
    print!("{manifest}");

    Ok(())
}

fn load_manifest(path: Option<PathBuf>) -> Result<Manifest> {
    let path = match path {
        Some(path) => path,
        None => default_manifest_path()?,
    };

    let data = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read manifest {:?}", path.display()))?;
    let manifest = data
        .parse()
        .with_context(|| format!("invalid manifest {:?}", path.display()))?;

    Ok(manifest)
}

fn select_hosts(mut manifest: Manifest, names: &[String]) -> Result<Manifest> {
    if names.is_empty() {
        return Ok(manifest);
    }

    for name in names {
        if manifest.host(name).is_none() {
            bail!("host {name:?} is not listed in manifest");
        }
    }

    manifest.hosts.retain(|host| names.contains(&host.name));
    Ok(manifest)
}

fn connect(spec: &HostSpec) -> Arc<dyn Host> {
    match &spec.root {
        Some(root) => Arc::new(LocalHost::with_root(&spec.name, root)),
        None => Arc::new(LocalHost::new(&spec.name)),
    }
}

/// Progress bar counting placed files across the fleet.
///
/// Log records of the wrapped [`TracingObserver`] are printed above the bar.
/// The bar only ends once the whole fleet is done, see
/// [`ProgressObserver::finish`].
struct ProgressObserver {
    bar: ProgressBar,
    logger: TracingObserver,
}

impl ProgressObserver {
    fn new() -> Result<Self> {
        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}] {pos}/{len}",
        )?
        .progress_chars("-Cco.");

        Ok(Self::with_bar(ProgressBar::new(0).with_style(style)))
    }

    fn with_bar(bar: ProgressBar) -> Self {
        Self {
            bar,
            logger: TracingObserver,
        }
    }

    fn finish(&self, success: bool) {
        if success {
            self.bar.finish_with_message("done");
        } else {
            self.bar.abandon_with_message("failed");
        }
    }
}

impl Observer for ProgressObserver {
    fn notify(&self, event: &DeployEvent<'_>) {
        match event {
            DeployEvent::EntryResolved { .. } => self.bar.inc_length(1),
            DeployEvent::FileUploaded { host, entry, .. }
            | DeployEvent::FileDownloaded { host, entry, .. } => {
                self.bar.set_message(format!("{host}: {entry}"));
                self.bar.inc(1);
            }
            DeployEvent::HostFinished { .. } => {
                self.bar.suspend(|| self.logger.notify(event));
            }
            _ => {}
        }
    }
}
