//! Minimal packet stream container used by the CLI.
//!
//! Format:
//! - magic: 4 bytes "OPAS"
//! - version: u16 LE
//! - sample_rate: u32 LE
//! - channels: u16 LE
//! - then repeated packets:
//!   - len: u16 LE
//!   - payload: [u8; len]
//!
//! Codec packets are never empty, so a zero-length entry marks a lost packet.

use std::io::{self, Read, Write};

pub const MAGIC: [u8; 4] = *b"OPAS";
pub const VERSION: u16 = 1;

/// Stream parameters recorded once at the start of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub sample_rate: u32,
    pub channels: u16,
}

pub fn write_header(mut w: impl Write, header: StreamHeader) -> io::Result<()> {
    w.write_all(&MAGIC)?;
    w.write_all(&VERSION.to_le_bytes())?;
    w.write_all(&header.sample_rate.to_le_bytes())?;
    w.write_all(&header.channels.to_le_bytes())?;
    Ok(())
}

/// Read and validate the container header.
pub fn read_header(mut r: impl Read) -> io::Result<StreamHeader> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad magic"));
    }

    let mut ver = [0u8; 2];
    r.read_exact(&mut ver)?;
    let version = u16::from_le_bytes(ver);
    if version != VERSION {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported version {version}"),
        ));
    }

    let mut rate = [0u8; 4];
    r.read_exact(&mut rate)?;
    let mut ch = [0u8; 2];
    r.read_exact(&mut ch)?;
    Ok(StreamHeader {
        sample_rate: u32::from_le_bytes(rate),
        channels: u16::from_le_bytes(ch),
    })
}

pub fn write_packet(mut w: impl Write, payload: &[u8]) -> io::Result<()> {
    let len: u16 = payload
        .len()
        .try_into()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "packet too large"))?;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(payload)?;
    Ok(())
}

/// Record a lost packet at this point in the stream.
pub fn write_loss(w: impl Write) -> io::Result<()> {
    write_packet(w, &[])
}

/// Read the next packet; `Ok(None)` on a clean end of stream.
pub fn read_packet(mut r: impl Read) -> io::Result<Option<Vec<u8>>> {
    let mut lenb = [0u8; 2];
    let mut filled = 0;
    while filled < lenb.len() {
        match r.read(&mut lenb[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated packet length",
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    let len = u16::from_le_bytes(lenb) as usize;
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)?;
    Ok(Some(payload))
}
