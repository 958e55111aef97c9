use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Receives a mirrored event stream on stdin and applies it under the
/// target directory. Stdout carries ping replies; logs go to stderr.
#[derive(Parser)]
#[command(name = "treecast-recv", version)]
struct Cli {
    /// Target directory; created when missing.
    target: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    treecast::receiver::run(&cli.target).await?;
    Ok(())
}
