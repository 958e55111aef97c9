//! In-memory snapshot of the mirrored tree.

use std::collections::HashMap;

use crate::wire::Stat;

/// Snapshot of one directory: entry name to its last observed [`Stat`].
pub type DirSnapshot = HashMap<String, Stat>;

/// Mapping from a root-relative directory path (`.` for the root) to its
/// snapshot. An absent key means the directory has not been enumerated; a
/// present key with an empty snapshot is a known-empty directory.
///
/// Owned exclusively by the differ; there is no interior locking.
#[derive(Debug, Default)]
pub struct Repository {
    dirs: HashMap<String, DirSnapshot>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `dir` as enumerated, keeping any existing snapshot.
    pub fn ensure_dir(&mut self, dir: &str) {
        self.dirs.entry(dir.to_string()).or_default();
    }

    pub fn put(&mut self, dir: &str, name: &str, stat: Stat) {
        self.dirs.entry(dir.to_string()).or_default().insert(name.to_string(), stat);
    }

    pub fn del(&mut self, dir: &str, name: &str) {
        if let Some(snapshot) = self.dirs.get_mut(dir) {
            snapshot.remove(name);
        }
    }

    pub fn list(&self, dir: &str) -> Option<&DirSnapshot> {
        self.dirs.get(dir)
    }

    /// Removes and returns the snapshot for `dir`, if enumerated.
    pub fn take_dir(&mut self, dir: &str) -> Option<DirSnapshot> {
        self.dirs.remove(dir)
    }

    pub fn replace(&mut self, dir: &str, snapshot: DirSnapshot) {
        self.dirs.insert(dir.to_string(), snapshot);
    }

    pub fn dir_count(&self) -> usize {
        self.dirs.len()
    }
}
