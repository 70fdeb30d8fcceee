use snafu::{OptionExt, Snafu};
use std::fmt::{Display, Formatter};

/// Errors when listing a directory through a [`Facade`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum ReadError {
    #[snafu(display("extent {offset:#x}+{len} is outside the image"))]
    OutOfBounds { offset: u64, len: u64 },

    #[snafu(display("invalid directory record at {offset:#x}"))]
    InvalidRecord { offset: u64 },

    #[snafu(display("block #{block} has descriptor tag {found}, expected {expected}"))]
    UnexpectedTag { block: u64, expected: u16, found: u16 },

    #[snafu(display("no {name} descriptor in the volume descriptor sequence"))]
    MissingDescriptor { name: &'static str },

    #[snafu(display("unsupported allocation descriptor type {ty} in ICB at block #{block}"))]
    UnsupportedAllocation { block: u64, ty: u8 },

    #[snafu(display("file at block #{block} is not recorded contiguously"))]
    Fragmented { block: u64 },

    #[snafu(display("continuation areas nest too deeply at {offset:#x}"))]
    ContinuationLoop { offset: u64 },
}

/// Naming layer used to present a disc image's directory tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacadeKind {
    /// Supplementary volume descriptor with UCS-2 names.
    Joliet,
    /// POSIX names from Rock Ridge `NM` entries on the primary tree.
    RockRidge,
    /// UDF file set on a bridge disc.
    Udf,
    /// Plain ISO 9660 identifiers from the primary volume descriptor.
    Iso9660,
}

impl FacadeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Joliet => "joliet",
            Self::RockRidge => "rock_ridge",
            Self::Udf => "udf",
            Self::Iso9660 => "iso9660",
        }
    }
}

impl Display for FacadeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a [`Node`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
    /// The `.` pseudo entry.
    Current,
    /// The `..` pseudo entry.
    Parent,
}

/// A directory entry as presented by a facade.
///
/// `offset` and `len` give the entry's data extent in bytes from the start of
/// the image. For directories this is the extent holding the directory's own
/// records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    name: String,
    kind: NodeKind,
    offset: u64,
    len: u64,
}

impl Node {
    pub(crate) fn new(name: String, kind: NodeKind, offset: u64, len: u64) -> Self {
        Self {
            name,
            kind,
            offset,
            len,
        }
    }

    /// Returns the decoded name, including any version suffix the facade keeps.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    #[must_use]
    pub fn is_dot(&self) -> bool {
        self.kind == NodeKind::Current
    }

    #[must_use]
    pub fn is_dotdot(&self) -> bool {
        self.kind == NodeKind::Parent
    }
}

/// A view of the image's directory tree under one naming layer.
///
/// Facades only list children; walking the tree is left to the caller.
pub trait Facade {
    /// Returns which naming layer this facade presents.
    fn kind(&self) -> FacadeKind;

    /// Returns the root directory.
    fn root(&self) -> Result<Node, ReadError>;

    /// Lists the entries of `dir`, including `.` and `..` where the format
    /// records them.
    fn list_children(&self, dir: &Node) -> Result<Vec<Node>, ReadError>;
}

/// Returns `len` bytes of `data` starting at `offset`.
pub(crate) fn extent(data: &[u8], offset: u64, len: u64) -> Result<&[u8], ReadError> {
    let start = usize::try_from(offset).ok();
    let end = offset
        .checked_add(len)
        .and_then(|v| usize::try_from(v).ok());

    match (start, end) {
        (Some(start), Some(end)) => data
            .get(start..end)
            .context(OutOfBoundsSnafu { offset, len }),
        _ => OutOfBoundsSnafu { offset, len }.fail(),
    }
}

/// Decodes big-endian UCS-2/UTF-16, replacing unpaired surrogates.
pub(crate) fn decode_utf16_be(bytes: &[u8]) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]));

    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent_checks_bounds() {
        let data = [0u8; 16];

        assert_eq!(extent(&data, 4, 8).unwrap().len(), 8);
        assert_eq!(extent(&data, 16, 0).unwrap().len(), 0);
        assert!(matches!(
            extent(&data, 12, 8),
            Err(ReadError::OutOfBounds { offset: 12, len: 8 })
        ));
        assert!(extent(&data, u64::MAX, 2).is_err());
    }

    #[test]
    fn utf16_names() {
        let raw: Vec<u8> = "Übung.txt;1"
            .encode_utf16()
            .flat_map(u16::to_be_bytes)
            .collect();

        assert_eq!(decode_utf16_be(&raw), "Übung.txt;1");
    }
}
