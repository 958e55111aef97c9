//! The receiver: reads framed events from stdin, applies them under the
//! target directory, and answers pings on stdout.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::apply::{self, Applier};
use crate::wire::WireEvent;

/// The receiver exits when no event (pings included) arrives for this long.
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(60);

/// Result of running the receiver.
pub type Result<T> = std::result::Result<T, Error>;

/// Receiver failures; the process exits non-zero on all of them.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    /// The target path exists but is not a directory.
    NotADirectory(PathBuf),
    /// stdin hit EOF or a framing error; the reader logged the detail.
    StreamEnded,
    /// The sender stopped heartbeating.
    WatchdogExpired,
    Apply(apply::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "receiver i/o failed: {err}"),
            Error::NotADirectory(path) => {
                write!(f, "target {} exists and is not a directory", path.display())
            }
            Error::StreamEnded => f.write_str("event stream ended"),
            Error::WatchdogExpired => {
                write!(f, "no events for {}s", WATCHDOG_TIMEOUT.as_secs())
            }
            Error::Apply(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Apply(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<apply::Error> for Error {
    fn from(err: apply::Error) -> Self {
        Error::Apply(err)
    }
}

/// Decodes frames off the wire and forwards them to the apply loop. The
/// channel closing signals EOF or a framing error.
pub struct ReadTask<S> {
    src: S,
    events: mpsc::Sender<WireEvent>,
}

impl<S: AsyncRead + Unpin + Send + 'static> ReadTask<S> {
    pub fn spawn(src: S) -> (JoinHandle<()>, mpsc::Receiver<WireEvent>) {
        let (events, rx) = mpsc::channel(1);
        let handle = tokio::spawn(Self { src, events }.run());
        (handle, rx)
    }

    async fn run(mut self) {
        loop {
            match WireEvent::read_from(&mut self.src).await {
                Ok(event) => {
                    if self.events.send(event).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    error!(error = %err, "event stream failed");
                    return;
                }
            }
        }
    }
}

/// Validates the target: creates it when missing, rejects non-directories.
pub fn ensure_target_dir(target: &Path) -> Result<()> {
    match std::fs::metadata(target) {
        Ok(md) if md.is_dir() => Ok(()),
        Ok(_) => Err(Error::NotADirectory(target.to_path_buf())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            std::fs::create_dir_all(target).map_err(Error::Io)
        }
        Err(err) => Err(err.into()),
    }
}

/// Runs the receiver until the stream ends, an apply fails, or the watchdog
/// expires. Never returns `Ok`.
pub async fn run(target: &Path) -> Result<()> {
    ensure_target_dir(target)?;
    std::env::set_current_dir(target)?;
    apply::clean_orphans(Path::new("."));

    let mut applier = Applier::new(".");
    let (reader, mut events) = ReadTask::spawn(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut pong = Vec::with_capacity(1);
    WireEvent::Ping.encode(&mut pong)?;

    info!(target = %target.display(), "receiving");
    let outcome = loop {
        let event = tokio::select! {
            received = events.recv() => match received {
                Some(event) => event,
                None => break Err(Error::StreamEnded),
            },
            () = tokio::time::sleep(WATCHDOG_TIMEOUT) => break Err(Error::WatchdogExpired),
        };
        if let WireEvent::Ping = event {
            if let Err(err) = stdout.write_all(&pong).await {
                break Err(err.into());
            }
            if let Err(err) = stdout.flush().await {
                break Err(err.into());
            }
            continue;
        }
        if let Err(err) = applier.apply(&event) {
            break Err(err.into());
        }
    };
    reader.abort();
    outcome
}
