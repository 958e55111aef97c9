//! Applies replicated events to the target tree.
//!
//! Regular files are staged in a temp file next to their final path and
//! moved into place with a rename, so the final path only ever holds the
//! previous version or the complete new one. Large files accumulate in a
//! temp file across `Big` chunks until `BigFinish` renames them into place;
//! `BigCancel` discards the accumulation.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::fmt;
use std::fs::{self, Permissions};
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Component, Path, PathBuf};

use filetime::FileTime;
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, warn};

use crate::wire::{Stat, WireEvent};

/// Prefix of staging temp files; orphans from a crash are recognizable by it.
pub const TMP_PREFIX: &str = ".treecast-";

/// Result of apply operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Apply errors. Everything here is fatal for the receiver: either local
/// I/O failed or the sender broke the protocol.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    /// The wire named a path that is absolute or escapes the target root.
    BadPath { dir: String, name: String },
    /// `BigFinish` without a matching in-flight transfer.
    OrphanFinish(PathBuf),
    /// `BigCancel` without a matching in-flight transfer.
    OrphanCancel(PathBuf),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "apply failed: {err}"),
            Error::BadPath { dir, name } => write!(f, "illegal event path {dir}/{name}"),
            Error::OrphanFinish(path) => {
                write!(f, "big finish for unknown transfer {}", path.display())
            }
            Error::OrphanCancel(path) => {
                write!(f, "big cancel for unknown transfer {}", path.display())
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

/// Applies events under a target root and tracks in-flight large files.
pub struct Applier {
    root: PathBuf,
    big: HashMap<PathBuf, NamedTempFile>,
}

impl Applier {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), big: HashMap::new() }
    }

    pub fn in_flight(&self) -> usize {
        self.big.len()
    }

    /// Applies one event. `Ping` is a no-op here; the receiver loop answers
    /// it on the reply channel.
    pub fn apply(&mut self, event: &WireEvent) -> Result<()> {
        debug!(event = ?event, "applying");
        match event {
            WireEvent::Ping => Ok(()),
            WireEvent::Write { dir, name, stat, content } => {
                let path = self.target_path(dir, name)?;
                self.write_entry(&path, stat, content)
            }
            WireEvent::Delete { dir, name } => {
                let path = self.target_path(dir, name)?;
                remove_recursive(&path)
            }
            WireEvent::Big { dir, name, content, .. } => self.append_big(dir, name, content),
            WireEvent::BigFinish { dir, name, stat, content } => {
                self.finish_big(dir, name, stat, content)
            }
            WireEvent::BigCancel { dir, name } => self.cancel_big(dir, name),
        }
    }

    /// Resolves `dir`/`name` under the root, rejecting absolute paths,
    /// parent components and separator-smuggling names.
    fn target_path(&self, dir: &str, name: &str) -> Result<PathBuf> {
        let bad = || Error::BadPath { dir: dir.to_string(), name: name.to_string() };
        if !is_clean_rel(dir) || !is_clean_name(name) {
            return Err(bad());
        }
        let mut path = self.root.clone();
        if dir != "." {
            path.push(dir);
        }
        path.push(name);
        Ok(path)
    }

    fn write_entry(&self, path: &Path, stat: &Stat, content: &[u8]) -> Result<()> {
        match fs::symlink_metadata(path) {
            Ok(existing) => {
                // Rename cannot atomically replace across kinds, and a
                // symlink target must not be written through.
                let existing_link = existing.file_type().is_symlink();
                if existing.is_dir() != stat.is_dir || existing_link || stat.is_link {
                    remove_recursive(path)?;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        if stat.is_dir {
            match fs::create_dir(path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
                Err(err) => return Err(err.into()),
            }
            fs::set_permissions(path, Permissions::from_mode(stat.mode.into()))?;
            Ok(())
        } else if stat.is_link {
            symlink(OsStr::from_bytes(content), path)?;
            Ok(())
        } else {
            let mut tmp = staging_file(path)?;
            tmp.as_file_mut().write_all(content)?;
            finish_file(tmp, path, stat)
        }
    }

    fn append_big(&mut self, dir: &str, name: &str, content: &[u8]) -> Result<()> {
        let path = self.target_path(dir, name)?;
        let tmp = match self.big.entry(path) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let tmp = staging_file(entry.key())?;
                entry.insert(tmp)
            }
        };
        tmp.as_file_mut().write_all(content)?;
        Ok(())
    }

    fn finish_big(&mut self, dir: &str, name: &str, stat: &Stat, content: &[u8]) -> Result<()> {
        let path = self.target_path(dir, name)?;
        let Some(mut tmp) = self.big.remove(&path) else {
            return Err(Error::OrphanFinish(path));
        };
        tmp.as_file_mut().write_all(content)?;
        finish_file(tmp, &path, stat)
    }

    fn cancel_big(&mut self, dir: &str, name: &str) -> Result<()> {
        let path = self.target_path(dir, name)?;
        match self.big.remove(&path) {
            // Dropping the staging file unlinks it.
            Some(_tmp) => Ok(()),
            None => Err(Error::OrphanCancel(path)),
        }
    }
}

fn is_clean_rel(dir: &str) -> bool {
    dir == "."
        || (!dir.is_empty()
            && Path::new(dir).components().all(|c| matches!(c, Component::Normal(_))))
}

fn is_clean_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('/')
        && matches!(
            Path::new(name).components().collect::<Vec<_>>().as_slice(),
            [Component::Normal(_)]
        )
}

/// Creates a staging temp file in the same directory as `target`, so the
/// final rename never crosses a filesystem boundary.
fn staging_file(target: &Path) -> Result<NamedTempFile> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Builder::new().prefix(TMP_PREFIX).tempfile_in(dir).map_err(Error::Io)
}

/// Chmod, chtimes, then rename onto the final path.
fn finish_file(tmp: NamedTempFile, target: &Path, stat: &Stat) -> Result<()> {
    fs::set_permissions(tmp.path(), Permissions::from_mode(stat.mode.into()))?;
    let mtime = FileTime::from_unix_time(stat.mtime, 0);
    filetime::set_file_times(tmp.path(), mtime, mtime)?;
    tmp.persist(target).map_err(|err| Error::Io(err.error))?;
    Ok(())
}

/// Removes a path of any kind; a missing path is not an error.
fn remove_recursive(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
        Ok(md) if md.is_dir() => fs::remove_dir_all(path).map_err(Error::Io),
        Ok(_) => fs::remove_file(path).map_err(Error::Io),
    }
}

/// Best-effort sweep of staging files left behind by an earlier crash.
pub fn clean_orphans(root: &Path) {
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(dir = %dir.display(), error = %err, "orphan sweep cannot list");
                continue;
            }
        };
        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file()
                && entry.file_name().to_string_lossy().starts_with(TMP_PREFIX)
            {
                warn!(path = %entry.path().display(), "removing orphaned staging file");
                let _ = fs::remove_file(entry.path());
            }
        }
    }
}
