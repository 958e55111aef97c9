//! The fixed-size metadata record carried by `Write`, `Big` and `BigFinish`.

use std::fmt;
use std::fs::Metadata;
use std::io::{self, Write};
use std::os::unix::fs::MetadataExt;

use byteorder::{ByteOrder, LittleEndian};

use super::primitive::{write_i64, write_u32};
use super::{Error, Result, STAT_LEN};

const DIR_BIT: u32 = 1 << 16;
const LINK_BIT: u32 = 1 << 17;

/// Snapshot of one filesystem entry.
///
/// Encodes to exactly [`STAT_LEN`] bytes: a `u32` packing the permission bits
/// with the kind flags, then `mtime` and `size` as `i64`. A `Stat` is never
/// mutated after construction; updates replace it wholesale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stat {
    pub is_dir: bool,
    pub is_link: bool,
    /// Permission bits; only the low 9 bits are meaningful.
    pub mode: u16,
    /// Seconds since the Unix epoch.
    pub mtime: i64,
    /// Byte size; for symlinks, the length of the link target.
    pub size: i64,
}

impl Stat {
    /// Builds a `Stat` from (non-followed) filesystem metadata.
    pub fn from_metadata(md: &Metadata) -> Self {
        Self {
            is_dir: md.is_dir(),
            is_link: md.file_type().is_symlink(),
            mode: (md.mode() & 0o777) as u16,
            mtime: md.mtime(),
            size: md.len() as i64,
        }
    }

    /// Whether two snapshots count as changed for change detection.
    ///
    /// Directories compare by mode alone, symlinks by target length alone;
    /// regular files compare mode, size and mtime. A kind change always
    /// counts as changed.
    pub fn differs(&self, other: &Stat) -> bool {
        if self.is_dir || other.is_dir {
            return !(self.is_dir && other.is_dir) || self.mode != other.mode;
        }
        if self.is_link || other.is_link {
            return !(self.is_link && other.is_link) || self.size != other.size;
        }
        self.mode != other.mode || self.size != other.size || self.mtime != other.mtime
    }

    pub fn encode(&self, dest: &mut impl Write) -> io::Result<()> {
        let mut flags = u32::from(self.mode);
        if self.is_dir {
            flags |= DIR_BIT;
        }
        if self.is_link {
            flags |= LINK_BIT;
        }
        write_u32(dest, flags)?;
        write_i64(dest, self.mtime)?;
        write_i64(dest, self.size)
    }

    /// Decodes a stat blob; the permission bits are masked to `0o777`.
    pub fn decode(buf: &[u8]) -> Result<Stat> {
        if buf.len() != STAT_LEN {
            return Err(Error::BadStatLen(buf.len()));
        }
        let flags = LittleEndian::read_u32(&buf[0..4]);
        Ok(Stat {
            is_dir: flags & DIR_BIT != 0,
            is_link: flags & LINK_BIT != 0,
            mode: (flags & 0o777) as u16,
            mtime: LittleEndian::read_i64(&buf[4..12]),
            size: LittleEndian::read_i64(&buf[12..20]),
        })
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_dir {
            "dir"
        } else if self.is_link {
            "link"
        } else {
            "file"
        };
        write!(
            f,
            "{kind} mode:{:o} mtime:{} size:{}",
            self.mode, self.mtime, self.size
        )
    }
}
