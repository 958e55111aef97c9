//! The tagged mutation record streamed from sender to receiver.

use std::fmt;
use std::io::{self, Write};

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::primitive::{read_blob, read_string, write_blob};
use super::{Error, Result, Stat, BIG_CHUNK_LEN, MAX_NAME_LEN, MAX_PATH_LEN, STAT_LEN};

/// The kind byte leading every frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum Kind {
    Ping = 0,
    Write = 1,
    Delete = 2,
    Big = 3,
    BigFinish = 4,
    BigCancel = 5,
}

/// One replication event as it travels on the wire.
///
/// `dir` is the directory path relative to the mirrored root (`.` for the
/// root itself), `name` the entry inside it. For directories the content is
/// empty, for symlinks it is the link target bytes, for regular files the
/// file contents (`Write`) or one chunk of them (`Big`/`BigFinish`).
#[derive(Clone, PartialEq, Eq)]
pub enum WireEvent {
    Ping,
    Write { dir: String, name: String, stat: Stat, content: Vec<u8> },
    Delete { dir: String, name: String },
    Big { dir: String, name: String, stat: Stat, content: Vec<u8> },
    BigFinish { dir: String, name: String, stat: Stat, content: Vec<u8> },
    BigCancel { dir: String, name: String },
}

impl WireEvent {
    pub fn kind(&self) -> Kind {
        match self {
            WireEvent::Ping => Kind::Ping,
            WireEvent::Write { .. } => Kind::Write,
            WireEvent::Delete { .. } => Kind::Delete,
            WireEvent::Big { .. } => Kind::Big,
            WireEvent::BigFinish { .. } => Kind::BigFinish,
            WireEvent::BigCancel { .. } => Kind::BigCancel,
        }
    }

    pub fn encode(&self, dest: &mut impl Write) -> io::Result<()> {
        dest.write_all(&[self.kind() as u8])?;
        match self {
            WireEvent::Ping => Ok(()),
            WireEvent::Delete { dir, name } | WireEvent::BigCancel { dir, name } => {
                write_blob(dest, dir.as_bytes())?;
                write_blob(dest, name.as_bytes())
            }
            WireEvent::Write { dir, name, stat, content }
            | WireEvent::Big { dir, name, stat, content }
            | WireEvent::BigFinish { dir, name, stat, content } => {
                write_blob(dest, dir.as_bytes())?;
                write_blob(dest, name.as_bytes())?;
                let mut blob = Vec::with_capacity(STAT_LEN);
                stat.encode(&mut blob)?;
                write_blob(dest, &blob)?;
                write_blob(dest, content)
            }
        }
    }

    /// Reads and decodes one frame from the stream.
    pub async fn read_from<S>(src: &mut S) -> Result<WireEvent>
    where
        S: AsyncRead + Unpin,
    {
        let byte = src.read_u8().await?;
        let kind = Kind::from_u8(byte).ok_or(Error::UnknownKind(byte))?;
        if kind == Kind::Ping {
            return Ok(WireEvent::Ping);
        }
        let dir = read_string(src, MAX_PATH_LEN, "dir").await?;
        let name = read_string(src, MAX_NAME_LEN, "name").await?;
        match kind {
            Kind::Delete => Ok(WireEvent::Delete { dir, name }),
            Kind::BigCancel => Ok(WireEvent::BigCancel { dir, name }),
            _ => {
                let blob = read_blob(src, STAT_LEN, "stat").await?;
                let stat = Stat::decode(&blob)?;
                let content = read_blob(src, BIG_CHUNK_LEN, "content").await?;
                Ok(match kind {
                    Kind::Write => WireEvent::Write { dir, name, stat, content },
                    Kind::Big => WireEvent::Big { dir, name, stat, content },
                    _ => WireEvent::BigFinish { dir, name, stat, content },
                })
            }
        }
    }
}

impl fmt::Debug for WireEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireEvent::Ping => write!(f, "ping"),
            WireEvent::Delete { dir, name } => write!(f, "delete {dir}/{name}"),
            WireEvent::BigCancel { dir, name } => write!(f, "bigcancel {dir}/{name}"),
            WireEvent::Write { dir, name, stat, content } => {
                write!(f, "write {dir}/{name} {stat} content:{}", content.len())
            }
            WireEvent::Big { dir, name, stat, content } => {
                write!(f, "big {dir}/{name} {stat} content:{}", content.len())
            }
            WireEvent::BigFinish { dir, name, stat, content } => {
                write!(f, "bigfinish {dir}/{name} {stat} content:{}", content.len())
            }
        }
    }
}
