//! Change detection: reconciles watcher-reported directories against the
//! repository snapshot and emits minimal ordered event batches.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_channel::Receiver;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::event_log::{Event, EventLog};
use crate::repo::Repository;
use crate::wire::Stat;

/// How long after the last dirty-directory notification a flush waits;
/// notifications within the window coalesce into one batch.
pub const DEBOUNCE: Duration = Duration::from_millis(400);

/// Joins a root-relative directory and an entry name.
pub fn join_rel(dir: &str, name: &str) -> String {
    if dir == "." {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Splits a root-relative path into parent directory and base name.
pub fn split_rel(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((parent, base)) => (parent, base),
        None => (".", path),
    }
}

/// Strips the source root from a watcher path. The root itself maps to `.`.
pub fn normalize(root: &Path, path: &Path) -> Option<String> {
    let rel = match path.strip_prefix(root) {
        Ok(rel) => rel,
        Err(_) => {
            warn!(path = %path.display(), "notification outside the source root");
            return None;
        }
    };
    let Some(rel) = rel.to_str() else {
        warn!(path = %path.display(), "skipping non-UTF-8 notification path");
        return None;
    };
    let trimmed = rel.trim_matches('/');
    if trimmed.is_empty() {
        Some(".".to_string())
    } else {
        Some(trimmed.to_string())
    }
}

/// Insertion-ordered set of dirty directories awaiting a flush.
#[derive(Debug, Default)]
pub struct Batch {
    order: Vec<String>,
    members: HashSet<String>,
}

impl Batch {
    pub fn insert(&mut self, dir: String) {
        if self.members.insert(dir.clone()) {
            self.order.push(dir);
        }
    }

    /// Returns the dirty directories in insertion order and clears the set.
    pub fn drain(&mut self) -> Vec<String> {
        self.members.clear();
        std::mem::take(&mut self.order)
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Reconciles directories against the repository and appends the resulting
/// events to the log. Single-owner: only the differ task touches it.
pub struct Differ {
    root: PathBuf,
    repo: Repository,
    log: Arc<EventLog>,
}

impl Differ {
    pub fn new(root: PathBuf, log: Arc<EventLog>) -> Self {
        Self { root, repo: Repository::new(), log }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// Enumerates the whole source tree into the repository without emitting
    /// events; the bulk sync covers the initial state.
    pub async fn scan(&mut self) -> io::Result<()> {
        walk(&self.root, &mut self.repo, ".".to_string(), None).await
    }

    /// Reconciles one dirty directory.
    ///
    /// A missing directory produces a single delete event for its entry in
    /// the parent; any other listing failure is fatal. Otherwise every listed
    /// entry is compared against the snapshot: new or changed entries emit a
    /// write event (and, when a directory newly appears, its whole subtree is
    /// walked and emitted), names that vanished emit delete events. The batch
    /// is appended to the log atomically.
    pub async fn diff(&mut self, dir: &str) -> io::Result<()> {
        let listing = match list_dir(&self.root.join(dir)).await {
            Ok(listing) => listing,
            Err(err) if err.kind() == io::ErrorKind::NotFound && dir != "." => {
                let (parent, base) = split_rel(dir);
                self.repo.del(parent, base);
                self.log.add(vec![Event {
                    dir: parent.to_string(),
                    name: base.to_string(),
                    is_delete: true,
                }]);
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let mut snapshot = self.repo.take_dir(dir).unwrap_or_default();
        let mut missing: HashSet<String> = snapshot.keys().cloned().collect();
        let mut events = Vec::new();

        for (name, stat) in listing {
            missing.remove(&name);
            let previous = snapshot.get(&name);
            let appeared_dir = stat.is_dir && previous.map_or(true, |old| !old.is_dir);
            if previous.map_or(true, |old| old.differs(&stat)) {
                snapshot.insert(name.clone(), stat);
                events.push(Event { dir: dir.to_string(), name: name.clone(), is_delete: false });
                if appeared_dir {
                    walk(&self.root, &mut self.repo, join_rel(dir, &name), Some(&mut events))
                        .await?;
                }
            }
        }

        let mut gone: Vec<String> = missing.into_iter().collect();
        gone.sort();
        for name in gone {
            snapshot.remove(&name);
            events.push(Event { dir: dir.to_string(), name, is_delete: true });
        }

        self.repo.replace(dir, snapshot);
        if !events.is_empty() {
            self.log.add(events);
        }
        Ok(())
    }
}

/// Lists a directory in name order, lstat-ing each entry. Entries that
/// vanish mid-listing or carry non-UTF-8 names are skipped.
async fn list_dir(path: &Path) -> io::Result<Vec<(String, Stat)>> {
    let mut read_dir = tokio::fs::read_dir(path).await?;
    let mut entries = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                warn!(dir = %path.display(), name = ?raw, "skipping non-UTF-8 entry name");
                continue;
            }
        };
        let md = match entry.metadata().await {
            Ok(md) => md,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err),
        };
        entries.push((name, Stat::from_metadata(&md)));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

/// Iterative depth-first walk from `start`, adding every entry to the
/// repository. When `events` is given, a write event is emitted for every
/// entry discovered, siblings in listing order, each subtree before the
/// next sibling tree.
async fn walk(
    root: &Path,
    repo: &mut Repository,
    start: String,
    mut events: Option<&mut Vec<Event>>,
) -> io::Result<()> {
    let mut stack = vec![start];
    while let Some(dir) = stack.pop() {
        let listing = list_dir(&root.join(&dir)).await?;
        repo.ensure_dir(&dir);
        let mut subdirs = Vec::new();
        for (name, stat) in listing {
            repo.put(&dir, &name, stat);
            if let Some(events) = events.as_mut() {
                events.push(Event { dir: dir.clone(), name: name.clone(), is_delete: false });
            }
            if stat.is_dir {
                subdirs.push(join_rel(&dir, &name));
            }
        }
        while let Some(sub) = subdirs.pop() {
            stack.push(sub);
        }
    }
    Ok(())
}

/// The debounce loop: collects dirty directories from the watcher channel
/// and flushes them through [`Differ::diff`] in insertion order once the
/// channel stays quiet for [`DEBOUNCE`].
pub struct DifferTask {
    differ: Differ,
    paths: Receiver<PathBuf>,
    batch: Batch,
}

impl DifferTask {
    pub fn new(differ: Differ, paths: Receiver<PathBuf>) -> Self {
        Self { differ, paths, batch: Batch::default() }
    }

    /// Runs until the watcher channel closes or a diff fails; both are fatal
    /// for the sender.
    pub async fn run(mut self) -> io::Result<()> {
        let mut deadline: Option<Instant> = None;
        loop {
            tokio::select! {
                received = self.paths.recv() => {
                    let path = received.map_err(|_| {
                        io::Error::new(io::ErrorKind::UnexpectedEof, "watcher channel closed")
                    })?;
                    if let Some(dir) = normalize(self.differ.root(), &path) {
                        self.batch.insert(dir);
                        deadline = Some(Instant::now() + DEBOUNCE);
                    }
                }
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    for dir in self.batch.drain() {
                        debug!(dir = %dir, "diffing");
                        self.differ.diff(&dir).await?;
                    }
                }
            }
        }
    }
}
