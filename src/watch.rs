//! Filesystem watching: turns platform notifications into dirty-directory
//! paths on a bounded channel.
//!
//! The backend is `notify`'s recommended watcher for the platform (inotify,
//! FSEvents, ReadDirectoryChangesW, kqueue). Each reported path is mapped to
//! the directory that contains it; the differ treats duplicates as
//! idempotent, so no deduplication happens here.

use std::path::{Path, PathBuf};

use async_channel::{bounded, Receiver, Sender};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::warn;

/// Capacity of the watcher-to-differ channel. The watcher thread blocks when
/// it is full: a dropped notification is never re-delivered.
pub const QUEUE_CAPACITY: usize = 10_000;

/// Starts watching `root` recursively. The returned watcher must be kept
/// alive for the subscription's lifetime; dirty absolute directory paths
/// arrive on the returned channel.
pub fn subscribe(root: &Path) -> notify::Result<(RecommendedWatcher, Receiver<PathBuf>)> {
    let (tx, rx) = bounded(QUEUE_CAPACITY);
    let watched = root.to_path_buf();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        forward(&watched, &tx, res);
    })?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok((watcher, rx))
}

fn forward(root: &Path, tx: &Sender<PathBuf>, res: notify::Result<notify::Event>) {
    let event = match res {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "watch backend error");
            return;
        }
    };
    if matches!(event.kind, EventKind::Access(_)) {
        return;
    }
    for path in event.paths {
        let dir = if path == root {
            path
        } else {
            match path.parent() {
                Some(parent) => parent.to_path_buf(),
                None => continue,
            }
        };
        if tx.send_blocking(dir).is_err() {
            return;
        }
    }
}
