use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use treecast::config::Settings;
use treecast::differ::{Differ, DifferTask};
use treecast::event_log::EventLog;
use treecast::peer::{PeerSpec, PeerTask};
use treecast::watch;

/// Continuously mirrors a source directory to one or more remote hosts.
#[derive(Parser)]
#[command(name = "treecast", version)]
struct Cli {
    /// Source directory to mirror.
    source: PathBuf,
    /// Mirroring targets, each as `[user@]host:target_dir`.
    #[arg(required = true)]
    peers: Vec<String>,
    /// Optional TOML settings file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Arc::new(Settings::load(cli.config.as_deref()).context("loading settings")?);
    let peers = cli
        .peers
        .iter()
        .map(|arg| PeerSpec::parse(arg))
        .collect::<Result<Vec<_>, _>>()?;

    std::env::set_current_dir(&cli.source)
        .with_context(|| format!("cannot enter source directory {}", cli.source.display()))?;
    let root = std::env::current_dir().context("cannot resolve the source directory")?;
    info!(version = env!("CARGO_PKG_VERSION"), source = %root.display(), "starting");

    let log = Arc::new(EventLog::new());
    let (_watcher, paths) = watch::subscribe(&root).context("cannot watch the source directory")?;

    let mut differ = Differ::new(root.clone(), Arc::clone(&log));
    differ.scan().await.context("initial scan failed")?;
    info!(dirs = differ.repo().dir_count(), "repository ready, processing filesystem events");

    for peer in peers {
        PeerTask::spawn(peer, root.clone(), Arc::clone(&log), Arc::clone(&settings));
    }

    DifferTask::new(differ, paths).run().await.context("change detection failed")?;
    Ok(())
}
