//! A library for reading SAF trailer archives.
//!
//! Some packaged Flash projectors carry their payload as an archive appended
//! to the executable, right after the last section's on-disk data:
//!
//! | Field    | Size             | Notes                               |
//! |----------|------------------|-------------------------------------|
//! | magic    | 3                | `SAF`                               |
//! | header   | 45               | unknown, skipped with the magic     |
//! | entries  | until end of file| see below                           |
//!
//! Each entry is a null-terminated UTF-16LE name, a signed 32-bit
//! little-endian payload length, the zlib payload, and 8 bytes of unknown
//! metadata.
//!
//! Every payload is inflated and hashed once when the archive is opened, so
//! sizes and digests are known up front.
//!
//! # Example
//!
//! ```no_run
//! use relic_saf::Archive;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("projector.exe")?;
//! let archive = Archive::new(bytes)?;
//!
//! for entry in archive.entries() {
//!     println!("{} {}", entry.path(), entry.len());
//! }
//! # Ok(())
//! # }
//! ```

use self::entry::ArchiveEntry;
use flate2::read::ZlibDecoder;
use sha2::{Digest, Sha256};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use std::collections::HashMap;
use std::io::Read;
use tracing::debug;

use open_error::*;

pub mod entry;
pub mod pe;

/// Magic at the start of the trailer.
pub const MAGIC: &[u8; 3] = b"SAF";

/// Length of the trailer header, magic included.
pub const HEADER_LEN: usize = 48;

/// A parsed trailer archive.
#[must_use]
pub struct Archive<R: AsRef<[u8]>> {
    raw: R,
    exe_eof: u64,
    entries: Vec<ArchiveEntry>,
    index: HashMap<String, usize>,
}

impl<R: AsRef<[u8]>> std::fmt::Debug for Archive<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("exe_eof", &self.exe_eof)
            .field("entry_count", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl<R: AsRef<[u8]>> Archive<R> {
    /// Parses the archive appended to the executable in `raw`.
    ///
    /// A name that occurs twice resolves to its last entry.
    pub fn new(raw: R) -> Result<Self, OpenError> {
        let data = raw.as_ref();
        let exe_eof = pe::exe_eof(data).context(ParseExecutableFailedSnafu)?;
        let start = usize::try_from(exe_eof)
            .ok()
            .filter(|&s| data.get(s..s + MAGIC.len()) == Some(MAGIC.as_slice()))
            .context(InvalidFormatSnafu { exe_eof })?;

        let mut pos = start + HEADER_LEN;

        ensure!(pos <= data.len(), TruncatedSnafu { offset: start as u64 });

        let mut entries = Vec::new();
        let mut index = HashMap::new();

        while pos < data.len() {
            let (entry, next) = parse_entry(data, pos)?;

            debug!(
                name = entry.name(),
                offset = entry.offset(),
                compressed = entry.compressed_len(),
                len = entry.len(),
                meta = %hex::encode(entry.meta()),
                "archive entry"
            );

            index.insert(entry.path(), entries.len());
            entries.push(entry);
            pos = next;
        }

        Ok(Self {
            raw,
            exe_eof,
            entries,
            index,
        })
    }

    /// Returns the offset at which the trailer starts.
    #[must_use]
    pub fn exe_eof(&self) -> u64 {
        self.exe_eof
    }

    /// Returns all entries in file order.
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Looks up an entry by its path (`/` + name).
    pub fn entry(&self, path: &str) -> Option<&ArchiveEntry> {
        self.index.get(path).map(|&i| &self.entries[i])
    }

    /// Returns the number of distinct paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Returns the paths in the archive.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    /// Inflates an entry's payload again.
    pub fn entry_data(&self, entry: &ArchiveEntry) -> Result<Vec<u8>, EntryDataError> {
        let payload = payload(self.raw.as_ref(), entry.offset, entry.compressed_len)
            .context(entry_data_error::InvalidDataOffsetSnafu)?;
        let mut out = Vec::with_capacity(entry.len as usize);

        ZlibDecoder::new(payload)
            .read_to_end(&mut out)
            .context(entry_data_error::InflateFailedSnafu)?;

        Ok(out)
    }
}

fn payload(data: &[u8], offset: u64, len: u64) -> Option<&[u8]> {
    let start = usize::try_from(offset).ok()?;
    let end = start.checked_add(usize::try_from(len).ok()?)?;
    data.get(start..end)
}

/// Parses the entry at `pos` and returns it with the offset of the next one.
fn parse_entry(data: &[u8], pos: usize) -> Result<(ArchiveEntry, usize), OpenError> {
    let offset = pos as u64;
    let mut units = Vec::new();
    let mut cur = pos;

    loop {
        let unit = data
            .get(cur..cur + 2)
            .context(TruncatedSnafu { offset })?;
        cur += 2;

        match u16::from_le_bytes([unit[0], unit[1]]) {
            0 => break,
            u => units.push(u),
        }
    }

    let name = String::from_utf16_lossy(&units);
    let size = data
        .get(cur..cur + 4)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .context(TruncatedSnafu { offset })?;
    cur += 4;

    ensure!(size >= 0, NegativeSizeSnafu { name: &name, size });

    let compressed = data
        .get(cur..cur + size as usize)
        .context(TruncatedSnafu { offset })?;
    let payload_offset = cur as u64;
    cur += size as usize;

    let mut inflated = Vec::new();
    ZlibDecoder::new(compressed)
        .read_to_end(&mut inflated)
        .context(InflateFailedSnafu { name: &name })?;

    let meta: [u8; 8] = data
        .get(cur..cur + 8)
        .and_then(|b| b.try_into().ok())
        .context(TruncatedSnafu { offset })?;
    cur += 8;

    let entry = ArchiveEntry {
        name,
        offset: payload_offset,
        compressed_len: size as u64,
        len: inflated.len() as u64,
        digest: Sha256::digest(&inflated).into(),
        meta,
    };

    Ok((entry, cur))
}

/// Errors for [`Archive::new()`].
#[derive(Debug, Snafu)]
#[snafu(module)]
#[non_exhaustive]
pub enum OpenError {
    #[snafu(display("cannot read the executable's section table"))]
    ParseExecutableFailed { source: pe::ReadError },

    #[snafu(display("no SAF trailer at {exe_eof:#x}"))]
    InvalidFormat { exe_eof: u64 },

    #[snafu(display("entry at {offset:#x} runs past the end of the file"))]
    Truncated { offset: u64 },

    #[snafu(display("entry {name:?} has negative payload length {size}"))]
    NegativeSize { name: String, size: i32 },

    #[snafu(display("cannot inflate entry {name:?}"))]
    InflateFailed {
        name: String,
        source: std::io::Error,
    },
}

/// Errors for [`Archive::entry_data()`].
#[derive(Debug, Snafu)]
#[snafu(module)]
#[non_exhaustive]
pub enum EntryDataError {
    #[snafu(display("entry has invalid data offset"))]
    InvalidDataOffset,

    #[snafu(display("cannot inflate entry payload"))]
    InflateFailed { source: std::io::Error },
}
