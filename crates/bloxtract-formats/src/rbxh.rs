//! RBXH cache frame codec.
//!
//! Every entry in the Roblox HTTP cache is a binary frame wrapping one
//! cached response. All integers are little-endian:
//!
//! | Offset | Size        | Meaning                                  |
//! |-------:|------------:|------------------------------------------|
//! | 0      | 4           | Magic `RBXH`                              |
//! | 4      | 4           | Header size                               |
//! | 8      | 4           | URL length                                |
//! | 12     | url len     | URL bytes (UTF-8, decoded lossily)        |
//! | —      | 1           | Reserved byte                             |
//! | —      | 4           | HTTP status (`>= 300` rejects the frame)  |
//! | —      | 4           | Header blob length                        |
//! | —      | 4           | XXHash digest of the headers              |
//! | —      | 4           | Body length                               |
//! | —      | 8           | Reserved + body digest                    |
//! | —      | headers len | Header blob                               |
//! | —      | body len    | Body bytes                                |
//!
//! Decoded frames retain every field, including the ones consumers discard,
//! so a well-formed frame re-encodes byte-for-byte.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use binrw::io::{Cursor, Read, Seek, Write};
use binrw::{BinRead, BinResult, BinWrite};
use parking_lot::Mutex;
use thiserror::Error;

/// RBXH magic bytes
pub const RBXH_MAGIC: [u8; 4] = *b"RBXH";

/// Result type for frame operations
pub type Result<T> = std::result::Result<T, RbxhError>;

/// Errors that can occur while decoding a cache frame
#[derive(Debug, Error)]
pub enum RbxhError {
    /// The stream did not start with the `RBXH` magic
    #[error("not an RBXH frame: magic {0:02X?}")]
    BadMagic([u8; 4]),

    /// The cached response carried a non-success HTTP status
    #[error("cached response has non-success status {0}")]
    NonSuccessStatus(u32),

    /// The stream ended before the named field could be read
    #[error("frame truncated while reading {0}")]
    Truncated(&'static str),

    /// The frame's URL was already seen during this scan
    #[error("duplicate link: {0}")]
    DuplicateLink(String),

    /// Underlying I/O failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl RbxhError {
    /// Collapse a `binrw` error back into the frame error it wraps.
    fn from_binrw(err: binrw::Error) -> Self {
        if let Some(frame_err) = err.custom_err::<Self>() {
            return match frame_err {
                Self::BadMagic(magic) => Self::BadMagic(*magic),
                Self::NonSuccessStatus(status) => Self::NonSuccessStatus(*status),
                Self::Truncated(field) => Self::Truncated(field),
                Self::DuplicateLink(url) => Self::DuplicateLink(url.clone()),
                // Parsing never embeds the remaining variants
                _ => Self::Truncated("frame"),
            };
        }
        match err {
            binrw::Error::Io(io) => Self::Io(io),
            _ => Self::Truncated("frame"),
        }
    }
}

/// One decoded cache frame.
///
/// `url` is kept as raw bytes so that frames with invalid UTF-8 links still
/// round-trip; use [`RbxhFrame::url`] for the lossily decoded form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RbxhFrame {
    /// Header size field (unused by consumers)
    pub header_size: u32,
    /// Raw URL bytes
    pub link: Vec<u8>,
    /// Reserved byte between the URL and the status
    pub reserved: u8,
    /// HTTP status of the cached response (always `< 300`)
    pub status: u32,
    /// XXHash digest of the header blob (unverified)
    pub headers_digest: u32,
    /// Reserved bytes and body digest (unverified)
    pub trailer: [u8; 8],
    /// Opaque response header blob
    pub headers: Vec<u8>,
    /// Response body
    pub body: Vec<u8>,
}

fn read_exact_field<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    field: &'static str,
) -> BinResult<()> {
    reader.read_exact(buf).map_err(|_| binrw::Error::Custom {
        pos: 0,
        err: Box::new(RbxhError::Truncated(field)),
    })
}

fn read_u32_field<R: Read>(reader: &mut R, field: &'static str) -> BinResult<u32> {
    let mut buf = [0u8; 4];
    read_exact_field(reader, &mut buf, field)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_vec_field<R: Read>(reader: &mut R, len: usize, field: &'static str) -> BinResult<Vec<u8>> {
    let mut buf = vec![0u8; len];
    read_exact_field(reader, &mut buf, field)?;
    Ok(buf)
}

/// Decode one frame, consulting `check_link` as soon as the URL bytes are
/// read — before the reserved byte and status. A repeated URL therefore
/// short-circuits even when the rest of the frame would fail to decode.
fn read_frame<R: Read>(
    reader: &mut R,
    mut check_link: impl FnMut(&[u8]) -> Option<RbxhError>,
) -> BinResult<RbxhFrame> {
    let mut magic = [0u8; 4];
    read_exact_field(reader, &mut magic, "magic")?;
    if magic != RBXH_MAGIC {
        return Err(binrw::Error::Custom {
            pos: 0,
            err: Box::new(RbxhError::BadMagic(magic)),
        });
    }

    let header_size = read_u32_field(reader, "header size")?;
    let link_len = read_u32_field(reader, "link length")?;
    let link = read_vec_field(reader, link_len as usize, "link")?;
    if let Some(err) = check_link(&link) {
        return Err(binrw::Error::Custom {
            pos: 0,
            err: Box::new(err),
        });
    }

    let mut reserved = [0u8; 1];
    read_exact_field(reader, &mut reserved, "reserved byte")?;

    let status = read_u32_field(reader, "status")?;
    if status >= 300 {
        return Err(binrw::Error::Custom {
            pos: 0,
            err: Box::new(RbxhError::NonSuccessStatus(status)),
        });
    }

    let headers_len = read_u32_field(reader, "headers length")?;
    let headers_digest = read_u32_field(reader, "headers digest")?;
    let body_len = read_u32_field(reader, "body length")?;

    let mut trailer = [0u8; 8];
    read_exact_field(reader, &mut trailer, "trailer")?;

    let headers = read_vec_field(reader, headers_len as usize, "headers")?;
    let body = read_vec_field(reader, body_len as usize, "body")?;

    Ok(RbxhFrame {
        header_size,
        link,
        reserved: reserved[0],
        status,
        headers_digest,
        trailer,
        headers,
        body,
    })
}

impl BinRead for RbxhFrame {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        _endian: binrw::Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        read_frame(reader, |_| None)
    }
}

impl BinWrite for RbxhFrame {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        _endian: binrw::Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        writer.write_all(&RBXH_MAGIC)?;
        writer.write_all(&self.header_size.to_le_bytes())?;
        writer.write_all(&(self.link.len() as u32).to_le_bytes())?;
        writer.write_all(&self.link)?;
        writer.write_all(&[self.reserved])?;
        writer.write_all(&self.status.to_le_bytes())?;
        writer.write_all(&(self.headers.len() as u32).to_le_bytes())?;
        writer.write_all(&self.headers_digest.to_le_bytes())?;
        writer.write_all(&(self.body.len() as u32).to_le_bytes())?;
        writer.write_all(&self.trailer)?;
        writer.write_all(&self.headers)?;
        writer.write_all(&self.body)?;
        Ok(())
    }
}

impl RbxhFrame {
    /// Decode a frame from a byte slice.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        Self::read_options(&mut cursor, binrw::Endian::Little, ()).map_err(RbxhError::from_binrw)
    }

    /// Decode a frame from any seekable reader.
    pub fn parse_reader<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        Self::read_options(reader, binrw::Endian::Little, ()).map_err(RbxhError::from_binrw)
    }

    /// Re-encode the frame to the documented layout.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);
        self.write_options(&mut cursor, binrw::Endian::Little, ())
            .map_err(RbxhError::from_binrw)?;
        Ok(buffer)
    }

    /// The request URL, decoded lossily.
    pub fn url(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.link)
    }
}

/// Frame parser with per-scan duplicate-link suppression.
///
/// The cache frequently holds several frames for the same URL; the first one
/// wins and later repeats fail with [`RbxhError::DuplicateLink`]. The check
/// fires as soon as the URL bytes are read — before the status is even
/// looked at — while a URL is only recorded once its whole frame decodes.
/// The seen set persists for the parser's lifetime and can be wiped with
/// [`RbxhParser::reset`] between scan passes.
#[derive(Debug, Default)]
pub struct RbxhParser {
    known_links: Mutex<HashSet<String>>,
}

impl RbxhParser {
    /// Create a parser with an empty seen set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a frame from bytes, rejecting repeated URLs.
    pub fn parse_bytes(&self, data: &[u8]) -> Result<RbxhFrame> {
        let mut cursor = Cursor::new(data);
        self.parse_stream(&mut cursor)
    }

    /// Decode a frame from a file on disk, rejecting repeated URLs.
    pub fn parse_file(&self, path: &Path) -> Result<RbxhFrame> {
        let mut reader = BufReader::new(File::open(path)?);
        self.parse_stream(&mut reader)
    }

    fn parse_stream<R: Read>(&self, reader: &mut R) -> Result<RbxhFrame> {
        let frame = read_frame(reader, |link| {
            if link.is_empty() {
                return None;
            }
            let url = String::from_utf8_lossy(link);
            if self.known_links.lock().contains(url.as_ref()) {
                tracing::debug!(url = %url, "skipping repeated link");
                return Some(RbxhError::DuplicateLink(url.into_owned()));
            }
            None
        })
        .map_err(RbxhError::from_binrw)?;

        let url = frame.url();
        if !url.is_empty() {
            self.known_links.lock().insert(url.into_owned());
        }
        Ok(frame)
    }

    /// Forget all seen URLs.
    pub fn reset(&self) {
        self.known_links.lock().clear();
    }

    /// Number of distinct URLs seen so far.
    pub fn known_link_count(&self) -> usize {
        self.known_links.lock().len()
    }
}
