//! Defect maps: ddrescue-style text describing which byte ranges of a disc
//! image were read successfully.
//!
//! ```text
//! # comment
//! 0x00000000  0x00010000  +
//! 0x00010000  0x00000800  -
//! ```
//!
//! Each data line is `pos size status`. Lines that do not have exactly three
//! tokens, or whose status is neither `+` nor `-`, are skipped.

use snafu::{ResultExt, Snafu};
use std::num::ParseIntError;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum DefectMapError {
    #[snafu(display("line {line}: invalid integer {token:?}"))]
    InvalidInteger {
        line: usize,
        token: String,
        source: ParseIntError,
    },
}

/// One data line of a defect map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefectRecord {
    pub pos: u64,
    /// `pos + size`.
    pub end: u64,
    pub good: bool,
}

/// A byte range closed at both ends.
///
/// Defect ranges and file extents are both compared in this form, so a file
/// ending exactly where a defect starts still counts as touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DefectRange {
    start: u64,
    stop: u64,
}

impl DefectRange {
    #[must_use]
    pub const fn new(start: u64, stop: u64) -> Self {
        Self { start, stop }
    }

    #[must_use]
    pub const fn start(&self) -> u64 {
        self.start
    }

    #[must_use]
    pub const fn stop(&self) -> u64 {
        self.stop
    }

    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.stop && other.start <= self.stop
    }
}

impl std::fmt::Display for DefectRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:#x}, {:#x}]", self.start, self.stop)
    }
}

/// Parses every recognised data line.
pub fn parse_records(text: &str) -> impl Iterator<Item = Result<DefectRecord, DefectMapError>> + '_ {
    text.lines().enumerate().filter_map(|(i, line)| {
        if line.starts_with('#') {
            return None;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let &[pos, size, status] = tokens.as_slice() else {
            return None;
        };

        let good = match status {
            "+" => true,
            "-" => false,
            _ => return None,
        };

        let line = i + 1;
        let parsed = parse_int(pos, line).and_then(|pos| {
            let size = parse_int(size, line)?;

            Ok(DefectRecord {
                pos,
                end: pos.saturating_add(size),
                good,
            })
        });

        Some(parsed)
    })
}

/// Parses a defect map and returns the ranges marked bad.
pub fn parse(text: &str) -> Result<Vec<DefectRange>, DefectMapError> {
    parse_records(text)
        .filter(|r| !matches!(r, Ok(DefectRecord { good: true, .. })))
        .map(|r| r.map(|r| DefectRange::new(r.pos, r.end)))
        .collect()
}

/// Parses an integer literal with an optional `0x`, `0o` or `0b` prefix.
fn parse_int(token: &str, line: usize) -> Result<u64, DefectMapError> {
    let lower = token.to_ascii_lowercase();
    let (digits, radix) = if let Some(d) = lower.strip_prefix("0x") {
        (d, 16)
    } else if let Some(d) = lower.strip_prefix("0o") {
        (d, 8)
    } else if let Some(d) = lower.strip_prefix("0b") {
        (d, 2)
    } else {
        (lower.as_str(), 10)
    };

    u64::from_str_radix(digits, radix).context(InvalidIntegerSnafu { line, token })
}
