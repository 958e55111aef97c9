//! Little-endian wire primitives shared by the encode and decode paths.

use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{Error, Result};

/// Writes a `u32` in little-endian order.
pub fn write_u32(dest: &mut impl Write, n: u32) -> io::Result<()> {
    dest.write_u32::<LittleEndian>(n)
}

/// Writes an `i64` in little-endian order.
pub fn write_i64(dest: &mut impl Write, n: i64) -> io::Result<()> {
    dest.write_i64::<LittleEndian>(n)
}

/// Writes a length-prefixed byte field: `u32` length, then the raw bytes.
pub fn write_blob(dest: &mut impl Write, bytes: &[u8]) -> io::Result<()> {
    write_u32(dest, bytes.len() as u32)?;
    dest.write_all(bytes)
}

/// Reads a length-prefixed byte field, rejecting lengths above `max`.
pub async fn read_blob<S>(src: &mut S, max: usize, field: &'static str) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let len = src.read_u32_le().await? as usize;
    if len > max {
        return Err(Error::Oversize { field, len, max });
    }
    let mut buf = vec![0u8; len];
    src.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Reads a length-prefixed UTF-8 string field.
pub async fn read_string<S>(src: &mut S, max: usize, field: &'static str) -> Result<String>
where
    S: AsyncRead + Unpin,
{
    String::from_utf8(read_blob(src, max, field).await?)
        .map_err(|err| Error::BadString { field, source: err.utf8_error() })
}
