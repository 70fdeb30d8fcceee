//! System Use Sharing Protocol entries and the Rock Ridge fields read from
//! them.

use crate::facade::{self, ContinuationLoopSnafu, ReadError};
use snafu::ensure;

/// Continuation areas followed before assuming a loop.
const MAX_CONTINUATIONS: usize = 16;

/// One SUSP entry.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Entry<'a> {
    pub signature: [u8; 2],
    /// Entry payload after the 4-byte header.
    pub data: &'a [u8],
}

/// Splits a system use area into entries, stopping at `ST` or at trailing
/// padding.
fn split(mut area: &[u8]) -> Vec<Entry<'_>> {
    let mut out = Vec::new();

    while area.len() >= 4 {
        let len = area[2] as usize;

        if len < 4 || len > area.len() {
            break;
        }

        let signature = [area[0], area[1]];

        if &signature == b"ST" {
            break;
        }

        out.push(Entry {
            signature,
            data: &area[4..len],
        });

        area = &area[len..];
    }

    out
}

/// Collects the entries of a system use area, following `CE` continuation
/// areas through the image.
pub(crate) fn entries<'a>(
    image: &'a [u8],
    area: &'a [u8],
    block_size: u64,
) -> Result<Vec<Entry<'a>>, ReadError> {
    let mut out = Vec::new();
    let mut pending = split(area);
    let mut hops = 0;

    loop {
        let mut next = None;

        for entry in pending {
            if &entry.signature == b"CE" && entry.data.len() >= 20 {
                let block = le32(&entry.data[0..4]);
                let offset = le32(&entry.data[8..12]);
                let len = le32(&entry.data[16..20]);

                next = Some((block * block_size + offset, len));
            } else {
                out.push(entry);
            }
        }

        let Some((offset, len)) = next else {
            return Ok(out);
        };

        hops += 1;
        ensure!(hops <= MAX_CONTINUATIONS, ContinuationLoopSnafu { offset });

        pending = split(facade::extent(image, offset, len)?);
    }
}

fn le32(b: &[u8]) -> u64 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as u64
}

/// Looks for the `SP` indicator in the root `.` record and a Rock Ridge
/// marker after it.
///
/// Returns the number of bytes to skip at the start of every other system use
/// area when Rock Ridge is present.
pub(crate) fn detect_rock_ridge(entries: &[Entry<'_>]) -> Option<u8> {
    let sp = entries.first().filter(|e| &e.signature == b"SP")?;

    if sp.data.len() < 3 || sp.data[0..2] != [0xBE, 0xEF] {
        return None;
    }

    let marked = entries
        .iter()
        .any(|e| matches!(&e.signature, b"RR" | b"ER" | b"PX" | b"NM"));

    marked.then_some(sp.data[2])
}

/// Rock Ridge attributes of one directory record.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct RockRidge {
    pub name: Option<String>,
    /// Target block of a `CL` child link (a relocated directory).
    pub child_link: Option<u64>,
    /// The record carries `RE`: it is the relocated copy and must be hidden.
    pub relocated: bool,
}

const NM_CONTINUE: u8 = 0x01;
const NM_CURRENT: u8 = 0x02;
const NM_PARENT: u8 = 0x04;

pub(crate) fn rock_ridge(entries: &[Entry<'_>]) -> RockRidge {
    let mut rr = RockRidge::default();
    let mut name: Option<Vec<u8>> = None;

    for entry in entries.iter().filter(|e| &e.signature == b"NM") {
        let Some((&flags, content)) = entry.data.split_first() else {
            continue;
        };

        if flags & (NM_CURRENT | NM_PARENT) != 0 {
            continue;
        }

        name.get_or_insert_with(Vec::new).extend_from_slice(content);

        // Without CONTINUE this component is complete.
        if flags & NM_CONTINUE == 0 {
            break;
        }
    }

    for entry in entries {
        match &entry.signature {
            b"CL" if entry.data.len() >= 4 => rr.child_link = Some(le32(&entry.data[0..4])),
            b"RE" => rr.relocated = true,
            _ => {}
        }
    }

    rr.name = name.map(|n| String::from_utf8_lossy(&n).into_owned());
    rr
}
