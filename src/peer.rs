//! Per-peer replication: bulk sync, receiver session, drive loop.
//!
//! Each peer runs an endless retry loop. A session first invokes the
//! external `rsync` over ssh to bring the target into gross alignment, then
//! starts the remote receiver and streams events from its event-log cursor
//! until something breaks; the next attempt starts five seconds later and
//! the bulk sync re-covers whatever the dead session missed.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::os::unix::ffi::OsStringExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Settings;
use crate::differ::join_rel;
use crate::event_log::{Client, Event, EventLog};
use crate::wire::{Stat, WireEvent, BIG_CHUNK_LEN};

/// Pause between session attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Cursor-drain timeout when idle; a ping goes out every time it expires.
pub const PING_INTERVAL: Duration = Duration::from_secs(15);

/// One mirroring target, given on the command line as `[user@]host:dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSpec {
    pub user: Option<String>,
    pub host: String,
    pub dir: String,
}

impl PeerSpec {
    pub fn parse(arg: &str) -> Result<PeerSpec, SpecError> {
        let &[host_part, dir] = arg.split(':').collect::<Vec<_>>().as_slice() else {
            return Err(SpecError::Malformed(arg.to_string()));
        };
        if host_part.is_empty() || dir.is_empty() {
            return Err(SpecError::Malformed(arg.to_string()));
        }
        let (user, host) = match host_part.split('@').collect::<Vec<_>>().as_slice() {
            &[user, host] => (Some(user.to_string()), host.to_string()),
            _ => (None, host_part.to_string()),
        };
        Ok(PeerSpec { user, host, dir: dir.to_string() })
    }

    /// The `user@host` (or bare `host`) argument for ssh and rsync.
    pub fn host_user(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }
}

impl fmt::Display for PeerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host_user(), self.dir)
    }
}

/// Peer-spec parse errors.
#[derive(Debug)]
pub enum SpecError {
    Malformed(String),
}

impl fmt::Display for SpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecError::Malformed(arg) => write!(f, "bad host:dir spec: {arg}"),
        }
    }
}

impl std::error::Error for SpecError {}

/// Errors that end one peer session. All of them are transient: the outer
/// loop restarts the session and the bulk sync restores convergence.
#[derive(Debug)]
pub enum SessionError {
    Io(io::Error),
    BulkSync(String),
    ReceiverClosed,
    /// An in-flight large file shrank under the transfer; the replacing
    /// event will arrive through a later diff.
    Shrunk(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Io(err) => write!(f, "session i/o failed: {err}"),
            SessionError::BulkSync(detail) => write!(f, "bulk sync failed: {detail}"),
            SessionError::ReceiverClosed => write!(f, "receiver stream closed"),
            SessionError::Shrunk(path) => write!(f, "{path} shrank during transfer"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SessionError {
    fn from(err: io::Error) -> Self {
        SessionError::Io(err)
    }
}

/// An open source file mid `Big` transfer.
pub struct BigFile {
    dir: String,
    name: String,
    file: File,
    stat: Stat,
    offset: u64,
}

/// In-flight large files, keyed by root-relative path.
pub type BigFiles = HashMap<String, BigFile>;

/// Builds the wire frame for one drained event, reading the source under
/// `root`. Returns `None` when the path vanished before it could be read; a
/// later notification converges the peer. Files above [`BIG_CHUNK_LEN`] are
/// registered in `bigs` and start with their first chunk.
pub async fn frame_for_event(
    root: &Path,
    event: &Event,
    bigs: &mut BigFiles,
) -> Result<Option<WireEvent>, SessionError> {
    let rel = join_rel(&event.dir, &event.name);
    let path = root.join(&rel);
    let dir = event.dir.clone();
    let name = event.name.clone();

    let md = match tokio::fs::symlink_metadata(&path).await {
        Ok(md) => md,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Ok(event.is_delete.then_some(WireEvent::Delete { dir, name }));
        }
        Err(err) => return Err(err.into()),
    };

    if md.file_type().is_symlink() {
        let target = match tokio::fs::read_link(&path).await {
            Ok(target) => target,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let content = target.into_os_string().into_vec();
        let stat = Stat {
            is_dir: false,
            is_link: true,
            mode: (md.mode() & 0o777) as u16,
            mtime: md.mtime(),
            size: content.len() as i64,
        };
        return Ok(Some(WireEvent::Write { dir, name, stat, content }));
    }

    if md.is_dir() {
        let stat = Stat::from_metadata(&md);
        return Ok(Some(WireEvent::Write { dir, name, stat, content: Vec::new() }));
    }

    let mut file = match File::open(&path).await {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let md = file.metadata().await?;
    let stat = Stat::from_metadata(&md);

    if md.len() > BIG_CHUNK_LEN as u64 {
        let mut content = vec![0u8; BIG_CHUNK_LEN];
        file.read_exact(&mut content).await?;
        bigs.insert(
            rel,
            BigFile {
                dir: dir.clone(),
                name: name.clone(),
                file,
                stat,
                offset: BIG_CHUNK_LEN as u64,
            },
        );
        return Ok(Some(WireEvent::Big { dir, name, stat, content }));
    }

    let mut content = Vec::with_capacity(md.len() as usize);
    file.read_to_end(&mut content).await?;
    Ok(Some(WireEvent::Write { dir, name, stat, content }))
}

/// Reads the next chunk of one in-flight large file (any of them) and
/// advances its offset; the final chunk closes the handle and becomes
/// `BigFinish`.
pub async fn next_big_frame(bigs: &mut BigFiles) -> Result<Option<WireEvent>, SessionError> {
    let Some(rel) = bigs.keys().next().cloned() else {
        return Ok(None);
    };
    let Some(big) = bigs.get_mut(&rel) else {
        return Ok(None);
    };
    let total = big.stat.size as u64;
    let remaining = total.saturating_sub(big.offset);
    if remaining == 0 {
        return Err(SessionError::Shrunk(rel));
    }
    let len = remaining.min(BIG_CHUNK_LEN as u64) as usize;
    let mut content = vec![0u8; len];
    big.file.read_exact(&mut content).await?;
    big.offset += len as u64;

    let done = big.offset == total;
    let (dir, name, stat) = (big.dir.clone(), big.name.clone(), big.stat);
    if done {
        bigs.remove(&rel);
        Ok(Some(WireEvent::BigFinish { dir, name, stat, content }))
    } else {
        Ok(Some(WireEvent::Big { dir, name, stat, content }))
    }
}

/// Parsed totals from rsync's `--stats` block.
#[derive(Debug, PartialEq, Eq)]
pub struct SyncStats {
    pub files: u64,
    pub transferred: u64,
    pub total_bytes: u64,
    pub transferred_bytes: u64,
}

/// Scans rsync `--stats` output. Handles both the old and the current
/// wording of the transferred-count line and comma-grouped numbers.
pub fn parse_sync_stats(output: &str) -> Option<SyncStats> {
    let mut files = None;
    let mut transferred = None;
    let mut total_bytes = None;
    let mut transferred_bytes = None;
    for line in output.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("Number of files:") {
            files = leading_number(rest);
        } else if let Some(rest) = line.strip_prefix("Number of regular files transferred:") {
            transferred = leading_number(rest);
        } else if let Some(rest) = line.strip_prefix("Number of files transferred:") {
            transferred = leading_number(rest);
        } else if let Some(rest) = line.strip_prefix("Total file size:") {
            total_bytes = leading_number(rest);
        } else if let Some(rest) = line.strip_prefix("Total transferred file size:") {
            transferred_bytes = leading_number(rest);
        }
    }
    Some(SyncStats {
        files: files?,
        transferred: transferred?,
        total_bytes: total_bytes?,
        transferred_bytes: transferred_bytes?,
    })
}

fn leading_number(text: &str) -> Option<u64> {
    let digits: String = text
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(char::is_ascii_digit)
        .collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

pub fn fmt_size(n: u64) -> String {
    if n < 1 << 10 {
        format!("{n} B")
    } else if n < 1 << 20 {
        format!("{} KiB", n >> 10)
    } else {
        format!("{} MiB", n >> 20)
    }
}

/// Best-effort throughput accounting for state-transition log lines.
struct Rate {
    bytes: u64,
    since: Instant,
}

impl Rate {
    fn new() -> Self {
        Self { bytes: 0, since: Instant::now() }
    }

    fn record(&mut self, n: usize) {
        self.bytes += n as u64;
    }

    fn report(&mut self) -> String {
        let elapsed = self.since.elapsed().as_secs_f64().max(0.001);
        let rate = (self.bytes as f64 / elapsed) as u64;
        self.bytes = 0;
        self.since = Instant::now();
        format!("{}ps", fmt_size(rate))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SyncState {
    Syncing,
    AllSynced,
    SendingBig,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Syncing => f.write_str("syncing"),
            SyncState::AllSynced => f.write_str("all synced"),
            SyncState::SendingBig => f.write_str("sending big"),
        }
    }
}

/// Drives replication to one peer for the lifetime of the sender.
pub struct PeerTask {
    spec: PeerSpec,
    root: PathBuf,
    log: Arc<EventLog>,
    settings: Arc<Settings>,
}

impl PeerTask {
    pub fn spawn(
        spec: PeerSpec,
        root: PathBuf,
        log: Arc<EventLog>,
        settings: Arc<Settings>,
    ) -> JoinHandle<()> {
        tokio::spawn(Self { spec, root, log, settings }.run())
    }

    async fn run(self) {
        loop {
            let err = self.session().await;
            error!(host = %self.spec.host, error = %err, "peer session ended");
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }

    /// One session: bulk sync, receiver spawn, drive loop. Returns the error
    /// that ended it; teardown closes the receiver and every open handle and
    /// drops the cursor.
    async fn session(&self) -> SessionError {
        if let Err(err) = self.bulk_sync().await {
            return err;
        }

        let mut child = match self.spawn_receiver() {
            Ok(child) => child,
            Err(err) => return err.into(),
        };
        let Some(mut stdin) = child.stdin.take() else {
            return SessionError::ReceiverClosed;
        };
        let Some(mut stdout) = child.stdout.take() else {
            return SessionError::ReceiverClosed;
        };

        let cancel = CancellationToken::new();
        let reader_cancel = cancel.clone();
        let reader = tokio::spawn(async move {
            let mut buf = [0u8; 512];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            reader_cancel.cancel();
        });

        let client = Client::register(&self.log, &self.spec.host);
        let err = self.drive(&mut stdin, &client, &cancel).await;

        let _ = child.kill().await;
        reader.abort();
        err
    }

    async fn bulk_sync(&self) -> Result<(), SessionError> {
        let shell = format!("ssh {}", self.settings.ssh.args().join(" "));
        let mut source = self.root.clone().into_os_string();
        source.push("/");
        let dest = format!("{}:{}/", self.spec.host_user(), self.spec.dir);

        info!(host = %self.spec.host, %dest, "bulk sync starting");
        let output = Command::new("rsync")
            .arg("-e")
            .arg(shell)
            .args(["-a", "--delete", "--stats"])
            .arg(source)
            .arg(&dest)
            .output()
            .await?;
        if !output.status.success() {
            return Err(SessionError::BulkSync(format!(
                "rsync exited {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_sync_stats(&stdout) {
            Some(stats) => info!(
                host = %self.spec.host,
                transferred = stats.transferred,
                transferred_bytes = stats.transferred_bytes,
                files = stats.files,
                total_bytes = stats.total_bytes,
                "bulk sync complete"
            ),
            None => {
                info!(host = %self.spec.host, "bulk sync complete");
                debug!(output = %stdout, "unrecognized rsync stats block");
            }
        }
        Ok(())
    }

    fn spawn_receiver(&self) -> io::Result<Child> {
        info!(host = %self.spec.host, command = %self.settings.receiver_cmd, "starting receiver");
        Command::new("ssh")
            .args(self.settings.ssh.args())
            .arg(self.spec.host_user())
            .arg(&self.settings.receiver_cmd)
            .arg(&self.spec.dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
    }

    /// The streaming loop. The drain timeout is zero while large files are
    /// in flight or the peer is not yet known to be in sync, else
    /// [`PING_INTERVAL`] so an idle session keeps heartbeating.
    async fn drive(
        &self,
        stdin: &mut ChildStdin,
        client: &Client,
        cancel: &CancellationToken,
    ) -> SessionError {
        let mut bigs = BigFiles::new();
        let mut buf = Vec::with_capacity(8192);
        let mut rate = Rate::new();
        let mut state = SyncState::Syncing;
        let mut reported = None;

        loop {
            let timeout = if !bigs.is_empty() || reported != Some(SyncState::AllSynced) {
                Duration::ZERO
            } else {
                PING_INTERVAL
            };
            let events = client.get(cancel, timeout).await;
            if cancel.is_cancelled() {
                return SessionError::ReceiverClosed;
            }
            if reported != Some(state) {
                info!(host = %self.spec.host, state = %state, rate = %rate.report(), "peer state");
                reported = Some(state);
            }

            if !bigs.is_empty() {
                state = SyncState::SendingBig;
                match next_big_frame(&mut bigs).await {
                    Ok(Some(frame)) => {
                        if let Err(err) = send(stdin, &mut buf, &frame, &mut rate).await {
                            return err.into();
                        }
                    }
                    Ok(None) => {}
                    Err(err) => return err,
                }
            }

            if events.is_empty() && bigs.is_empty() {
                state = SyncState::AllSynced;
                if let Err(err) = send(stdin, &mut buf, &WireEvent::Ping, &mut rate).await {
                    return err.into();
                }
                continue;
            }

            for event in &events {
                state = SyncState::Syncing;
                let rel = join_rel(&event.dir, &event.name);
                if bigs.remove(&rel).is_some() {
                    let frame = WireEvent::BigCancel {
                        dir: event.dir.clone(),
                        name: event.name.clone(),
                    };
                    if let Err(err) = send(stdin, &mut buf, &frame, &mut rate).await {
                        return err.into();
                    }
                }
                match frame_for_event(&self.root, event, &mut bigs).await {
                    Ok(Some(frame)) => {
                        if let Err(err) = send(stdin, &mut buf, &frame, &mut rate).await {
                            return err.into();
                        }
                    }
                    Ok(None) => {}
                    Err(err) => return err,
                }
            }
        }
    }
}

async fn send(
    stdin: &mut ChildStdin,
    buf: &mut Vec<u8>,
    frame: &WireEvent,
    rate: &mut Rate,
) -> io::Result<()> {
    buf.clear();
    frame.encode(buf)?;
    stdin.write_all(buf).await?;
    stdin.flush().await?;
    rate.record(buf.len());
    debug!(frame = ?frame, "sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::symlink;
    use crate::wire::Kind;

    fn event(dir: &str, name: &str, is_delete: bool) -> Event {
        Event { dir: dir.to_string(), name: name.to_string(), is_delete }
    }

    #[test]
    fn test_peer_spec_parse() {
        let spec = PeerSpec::parse("backup:/srv/mirror").unwrap();
        assert_eq!(spec, PeerSpec { user: None, host: "backup".into(), dir: "/srv/mirror".into() });
        assert_eq!(spec.host_user(), "backup");
        assert_eq!(spec.to_string(), "backup:/srv/mirror");

        let spec = PeerSpec::parse("deploy@backup:/srv/mirror").unwrap();
        assert_eq!(spec.user.as_deref(), Some("deploy"));
        assert_eq!(spec.host_user(), "deploy@backup");
    }

    #[test]
    fn test_peer_spec_rejects_malformed() {
        assert!(PeerSpec::parse("no-colon").is_err());
        assert!(PeerSpec::parse("a:b:c").is_err());
        assert!(PeerSpec::parse(":dir").is_err());
        assert!(PeerSpec::parse("host:").is_err());
    }

    #[test]
    fn test_parse_sync_stats_current_format() {
        let output = "\nNumber of files: 1,204 (reg: 1,084, dir: 120)\n\
            Number of created files: 2\n\
            Number of regular files transferred: 11\n\
            Total file size: 1,431,655 bytes\n\
            Total transferred file size: 44,120 bytes\n";
        assert_eq!(
            parse_sync_stats(output),
            Some(SyncStats {
                files: 1204,
                transferred: 11,
                total_bytes: 1_431_655,
                transferred_bytes: 44_120,
            })
        );
    }

    #[test]
    fn test_parse_sync_stats_old_format() {
        let output = "Number of files: 12\n\
            Number of files transferred: 3\n\
            Total file size: 999 bytes\n\
            Total transferred file size: 120 bytes\n";
        assert_eq!(
            parse_sync_stats(output),
            Some(SyncStats { files: 12, transferred: 3, total_bytes: 999, transferred_bytes: 120 })
        );
    }

    #[test]
    fn test_parse_sync_stats_rejects_garbage() {
        assert_eq!(parse_sync_stats("rsync: connection unexpectedly closed"), None);
    }

    #[test]
    fn test_fmt_size() {
        assert_eq!(fmt_size(512), "512 B");
        assert_eq!(fmt_size(2048), "2 KiB");
        assert_eq!(fmt_size(3 << 20), "3 MiB");
    }

    #[tokio::test]
    async fn test_frame_for_small_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let mut bigs = BigFiles::new();

        let frame = frame_for_event(dir.path(), &event(".", "a.txt", false), &mut bigs)
            .await
            .unwrap()
            .unwrap();
        let WireEvent::Write { dir, name, stat, content } = frame else {
            panic!("expected a write frame");
        };
        assert_eq!((dir.as_str(), name.as_str()), (".", "a.txt"));
        assert_eq!(content, b"hello");
        assert_eq!(stat.size, 5);
        assert!(bigs.is_empty());
    }

    #[tokio::test]
    async fn test_frame_for_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let mut bigs = BigFiles::new();

        let frame = frame_for_event(dir.path(), &event(".", "sub", false), &mut bigs)
            .await
            .unwrap()
            .unwrap();
        let WireEvent::Write { stat, content, .. } = frame else {
            panic!("expected a write frame");
        };
        assert!(stat.is_dir);
        assert!(content.is_empty());
    }

    #[tokio::test]
    async fn test_frame_for_symlink_carries_target() {
        let dir = tempfile::tempdir().unwrap();
        symlink("some/target", dir.path().join("ln")).unwrap();
        let mut bigs = BigFiles::new();

        let frame = frame_for_event(dir.path(), &event(".", "ln", false), &mut bigs)
            .await
            .unwrap()
            .unwrap();
        let WireEvent::Write { stat, content, .. } = frame else {
            panic!("expected a write frame");
        };
        assert!(stat.is_link);
        assert_eq!(content, b"some/target");
        assert_eq!(stat.size, b"some/target".len() as i64);
    }

    #[tokio::test]
    async fn test_frame_for_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut bigs = BigFiles::new();

        let frame = frame_for_event(dir.path(), &event(".", "gone", true), &mut bigs)
            .await
            .unwrap();
        assert_eq!(frame, Some(WireEvent::Delete { dir: ".".into(), name: "gone".into() }));

        let frame = frame_for_event(dir.path(), &event(".", "gone", false), &mut bigs)
            .await
            .unwrap();
        assert_eq!(frame, None);
    }

    #[tokio::test]
    async fn test_threshold_file_is_a_single_write() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("edge"), vec![1u8; BIG_CHUNK_LEN]).unwrap();
        let mut bigs = BigFiles::new();

        let frame = frame_for_event(dir.path(), &event(".", "edge", false), &mut bigs)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.kind(), Kind::Write);
        assert!(bigs.is_empty());
    }

    #[tokio::test]
    async fn test_one_byte_over_threshold_is_chunked() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("over"), vec![1u8; BIG_CHUNK_LEN + 1]).unwrap();
        let mut bigs = BigFiles::new();

        let first = frame_for_event(dir.path(), &event(".", "over", false), &mut bigs)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.kind(), Kind::Big);

        let last = next_big_frame(&mut bigs).await.unwrap().unwrap();
        let WireEvent::BigFinish { content, .. } = &last else {
            panic!("expected a finishing frame");
        };
        assert_eq!(content.len(), 1);
        assert!(bigs.is_empty());
    }

    #[tokio::test]
    async fn test_big_file_chunks_and_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let size = 5 << 20;
        fs::write(dir.path().join("big"), vec![7u8; size]).unwrap();
        let mut bigs = BigFiles::new();

        let first = frame_for_event(dir.path(), &event(".", "big", false), &mut bigs)
            .await
            .unwrap()
            .unwrap();
        let WireEvent::Big { content, stat, .. } = &first else {
            panic!("expected a big frame");
        };
        assert_eq!(content.len(), BIG_CHUNK_LEN);
        assert_eq!(stat.size, size as i64);
        assert_eq!(bigs.len(), 1);

        let second = next_big_frame(&mut bigs).await.unwrap().unwrap();
        assert_eq!(second.kind(), Kind::Big);

        let last = next_big_frame(&mut bigs).await.unwrap().unwrap();
        let WireEvent::BigFinish { content, .. } = &last else {
            panic!("expected a finishing frame");
        };
        assert_eq!(content.len(), size - 2 * BIG_CHUNK_LEN);
        assert!(bigs.is_empty());
        assert!(next_big_frame(&mut bigs).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_big_file_fails_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big");
        fs::write(&path, vec![7u8; (2 << 20) + 100]).unwrap();
        let mut bigs = BigFiles::new();

        frame_for_event(dir.path(), &event(".", "big", false), &mut bigs)
            .await
            .unwrap()
            .unwrap();
        fs::File::options().write(true).open(&path).unwrap().set_len(100).unwrap();

        assert!(next_big_frame(&mut bigs).await.is_err());
    }
}
