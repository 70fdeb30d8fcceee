//! UDF bridge support: the volume descriptor sequence, the file set and a
//! directory reader over file identifier descriptors.
//!
//! Only what is needed to name files and locate their data is parsed. Files
//! must be recorded as one contiguous run of blocks.

use crate::SECTOR_SIZE;
use crate::facade::{
    self, Facade, FacadeKind, FragmentedSnafu, MissingDescriptorSnafu, Node, NodeKind, ReadError,
    UnexpectedTagSnafu, UnsupportedAllocationSnafu,
};
use snafu::ensure;
use zerocopy::{
    FromBytes, Immutable, KnownLayout, Unaligned,
    little_endian::{U16, U32},
};

/// The anchor volume descriptor pointer lives at sector 256.
const ANCHOR_SECTOR: u64 = 256;

const TAG_ANCHOR: u16 = 2;
const TAG_PARTITION: u16 = 5;
const TAG_LOGICAL_VOLUME: u16 = 6;
const TAG_TERMINATING: u16 = 8;
const TAG_FILE_SET: u16 = 256;
const TAG_FILE_IDENTIFIER: u16 = 257;
const TAG_FILE_ENTRY: u16 = 261;
const TAG_EXTENDED_FILE_ENTRY: u16 = 266;

const FILE_TYPE_DIRECTORY: u8 = 4;

/// Descriptor tag (ECMA-167 3/7.2).
#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct TagRaw {
    id: U16,
    _version: U16,
    _checksum: u8,
    _reserved: u8,
    _serial: U16,
    _crc: U16,
    _crc_len: U16,
    _location: U32,
}

/// `long_ad` (ECMA-167 4/14.14.2).
#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct LongAdRaw {
    len: U32,
    block: U32,
    _partition: U16,
    _implementation: [u8; 6],
}

bitflags::bitflags! {
    /// File characteristics of a file identifier descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Characteristics: u8 {
        const HIDDEN = 0x01;
        const DIRECTORY = 0x02;
        const DELETED = 0x04;
        const PARENT = 0x08;
        const METADATA = 0x10;
    }
}

/// Upper 2 bits of an extent length carry the extent type.
const EXTENT_LEN_MASK: u32 = 0x3FFF_FFFF;

/// Located UDF file set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Volume {
    partition_start: u64,
    block_size: u64,
    root_icb: u64,
}

impl Volume {
    /// Follows the anchor to the partition and file set descriptors.
    pub(crate) fn open(data: &[u8]) -> Result<Self, ReadError> {
        let sector = SECTOR_SIZE as u64;
        let anchor = descriptor(data, ANCHOR_SECTOR, sector, TAG_ANCHOR)?;

        let vds_len = le32(&anchor[16..20]) as u64;
        let vds_block = le32(&anchor[20..24]) as u64;

        let mut partition_start = None;
        let mut logical = None;

        for block in vds_block..vds_block + vds_len.div_ceil(sector) {
            let buf = facade::extent(data, block * sector, sector)?;
            let (tag, _) = TagRaw::ref_from_prefix(buf).map_err(|_| {
                ReadError::OutOfBounds {
                    offset: block * sector,
                    len: sector,
                }
            })?;

            match tag.id.get() {
                TAG_PARTITION if partition_start.is_none() => {
                    partition_start = Some(le32(&buf[188..192]) as u64);
                }
                TAG_LOGICAL_VOLUME if logical.is_none() => {
                    let block_size = le32(&buf[212..216]) as u64;
                    let (fsd, _) = LongAdRaw::ref_from_prefix(&buf[248..]).map_err(|_| {
                        ReadError::OutOfBounds {
                            offset: block * sector + 248,
                            len: 16,
                        }
                    })?;

                    logical = Some((block_size, fsd.block.get() as u64));
                }
                TAG_TERMINATING => break,
                _ => {}
            }
        }

        let partition_start = partition_start.ok_or_else(|| {
            MissingDescriptorSnafu { name: "partition" }.build()
        })?;
        let (block_size, fsd_block) = logical.ok_or_else(|| {
            MissingDescriptorSnafu {
                name: "logical volume",
            }
            .build()
        })?;

        ensure!(
            block_size.is_power_of_two() && block_size >= 512,
            MissingDescriptorSnafu {
                name: "logical volume",
            }
        );

        let fsd_block = partition_start + fsd_block;
        let fsd = descriptor(data, fsd_block, block_size, TAG_FILE_SET)?;
        let (root, _) = LongAdRaw::ref_from_prefix(&fsd[400..]).map_err(|_| {
            ReadError::OutOfBounds {
                offset: block_offset(0, fsd_block, block_size).unwrap_or(u64::MAX),
                len: 16,
            }
        })?;

        Ok(Self {
            partition_start,
            block_size,
            root_icb: root.block.get() as u64,
        })
    }

    /// Reads the file entry at logical block `icb` and returns its data extent
    /// in image bytes, its length, and whether it is a directory.
    fn file_entry(&self, data: &[u8], icb: u64) -> Result<(u64, u64, bool), ReadError> {
        let block = self.partition_start + icb;
        let base = block_offset(self.partition_start, icb, self.block_size)?;
        let buf = facade::extent(data, base, self.block_size)?;
        let (tag, _) = TagRaw::ref_from_prefix(buf).map_err(|_| ReadError::OutOfBounds {
            offset: base,
            len: self.block_size,
        })?;

        // Offsets of: information length, L_EA, L_AD, start of extended attributes.
        let (info_at, lea_at, header_len) = match tag.id.get() {
            TAG_FILE_ENTRY => (56, 168, 176),
            TAG_EXTENDED_FILE_ENTRY => (56, 208, 216),
            found => {
                return UnexpectedTagSnafu {
                    block,
                    expected: TAG_FILE_ENTRY,
                    found,
                }
                .fail();
            }
        };

        let file_type = buf[27];
        let icb_flags = le16(&buf[34..36]);
        let info_len = le64(&buf[info_at..info_at + 8]);
        let ea_len = le32(&buf[lea_at..lea_at + 4]) as usize;
        let ad_len = le32(&buf[lea_at + 4..lea_at + 8]) as usize;

        let ad_start = header_len + ea_len;
        let ads = buf
            .get(ad_start..ad_start + ad_len)
            .ok_or(ReadError::OutOfBounds {
                offset: base + ad_start as u64,
                len: ad_len as u64,
            })?;

        let is_dir = file_type == FILE_TYPE_DIRECTORY;

        // Extents as (logical block, byte length).
        let extents: Vec<(u64, u64)> = match (icb_flags & 0x7) as u8 {
            0 => ads
                .chunks_exact(8)
                .map(|ad| (le32(&ad[4..8]) as u64, (le32(&ad[0..4]) & EXTENT_LEN_MASK) as u64))
                .collect(),
            1 => ads
                .chunks_exact(16)
                .map(|ad| (le32(&ad[4..8]) as u64, (le32(&ad[0..4]) & EXTENT_LEN_MASK) as u64))
                .collect(),
            3 => return Ok((base + ad_start as u64, info_len, is_dir)),
            ty => return UnsupportedAllocationSnafu { block, ty }.fail(),
        };

        let extents: Vec<_> = extents.into_iter().filter(|&(_, len)| len > 0).collect();

        let Some(&(first, _)) = extents.first() else {
            return Ok((base, 0, is_dir));
        };

        // Every extent must start where the previous one ended.
        let mut expected = first;
        for &(start, len) in &extents {
            ensure!(start == expected, FragmentedSnafu { block });
            expected = start + len.div_ceil(self.block_size);
        }

        Ok((
            block_offset(self.partition_start, first, self.block_size)?,
            info_len,
            is_dir,
        ))
    }
}

/// Facade over the UDF file set.
#[derive(Debug)]
pub struct UdfFacade<'a> {
    data: &'a [u8],
    volume: Volume,
}

impl<'a> UdfFacade<'a> {
    pub(crate) fn new(data: &'a [u8], volume: Volume) -> Self {
        Self { data, volume }
    }
}

impl Facade for UdfFacade<'_> {
    fn kind(&self) -> FacadeKind {
        FacadeKind::Udf
    }

    fn root(&self) -> Result<Node, ReadError> {
        let (offset, len, _) = self.volume.file_entry(self.data, self.volume.root_icb)?;

        Ok(Node::new(String::new(), NodeKind::Directory, offset, len))
    }

    fn list_children(&self, dir: &Node) -> Result<Vec<Node>, ReadError> {
        let buf = facade::extent(self.data, dir.offset(), dir.len())?;
        let mut out = Vec::new();
        let mut pos = 0usize;

        while pos + 38 <= buf.len() {
            let at = dir.offset() + pos as u64;
            let fid = &buf[pos..];
            let id = le16(&fid[0..2]);

            ensure!(
                id == TAG_FILE_IDENTIFIER,
                UnexpectedTagSnafu {
                    block: at / self.volume.block_size,
                    expected: TAG_FILE_IDENTIFIER,
                    found: id,
                }
            );

            let characteristics = Characteristics::from_bits_retain(fid[18]);
            let name_len = fid[19] as usize;
            let icb = le32(&fid[24..28]) as u64;
            let iu_len = le16(&fid[36..38]) as usize;
            let total = (38 + iu_len + name_len).next_multiple_of(4);

            let name = fid
                .get(38 + iu_len..38 + iu_len + name_len)
                .ok_or(ReadError::InvalidRecord { offset: at })?;

            pos += total;

            if characteristics.contains(Characteristics::DELETED) {
                continue;
            }

            if characteristics.contains(Characteristics::PARENT) {
                out.push(Node::new(String::new(), NodeKind::Parent, 0, 0));
                continue;
            }

            let (offset, len, is_dir) = self.volume.file_entry(self.data, icb)?;
            let kind = if is_dir || characteristics.contains(Characteristics::DIRECTORY) {
                NodeKind::Directory
            } else {
                NodeKind::File
            };

            out.push(Node::new(decode_dstring(name), kind, offset, len));
        }

        Ok(out)
    }
}

/// Reads a tagged descriptor and checks its identifier.
fn descriptor(data: &[u8], block: u64, block_size: u64, expected: u16) -> Result<&[u8], ReadError> {
    let buf = facade::extent(data, block_offset(0, block, block_size)?, block_size)?;
    let found = le16(&buf[0..2]);

    ensure!(
        found == expected,
        UnexpectedTagSnafu {
            block,
            expected,
            found,
        }
    );

    Ok(buf)
}

/// Returns the image byte offset of logical `block` in a partition that
/// starts at block `partition_start`.
fn block_offset(partition_start: u64, block: u64, block_size: u64) -> Result<u64, ReadError> {
    partition_start
        .checked_add(block)
        .and_then(|b| b.checked_mul(block_size))
        .ok_or(ReadError::OutOfBounds {
            offset: u64::MAX,
            len: block_size,
        })
}

/// Decodes an OSTA CS0 identifier: a compression id byte followed by 8-bit or
/// 16-bit big-endian characters.
fn decode_dstring(raw: &[u8]) -> String {
    match raw.split_first() {
        Some((8, rest)) => rest.iter().map(|&b| b as char).collect(),
        Some((16, rest)) => facade::decode_utf16_be(rest),
        Some((_, rest)) => String::from_utf8_lossy(rest).into_owned(),
        None => String::new(),
    }
}

fn le16(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

fn le32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn le64(b: &[u8]) -> u64 {
    u64::from_le_bytes(b[..8].try_into().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cs0_names() {
        assert_eq!(decode_dstring(b"\x08bar.txt"), "bar.txt");
        assert_eq!(decode_dstring(b"\x10\x00a\x00b"), "ab");
        assert_eq!(decode_dstring(b""), "");
    }

    #[test]
    fn huge_blocks_are_out_of_bounds() {
        let data = vec![0u8; 300 * SECTOR_SIZE];
        let volume = Volume {
            partition_start: u32::MAX as u64,
            block_size: 1 << 40,
            root_icb: 0,
        };

        assert!(matches!(
            volume.file_entry(&data, u32::MAX as u64),
            Err(ReadError::OutOfBounds { .. })
        ));
        assert!(matches!(
            descriptor(&data, u64::MAX / 2, 4096, TAG_FILE_SET),
            Err(ReadError::OutOfBounds { .. })
        ));
        assert_eq!(block_offset(16, 4, 2048).unwrap(), 20 * 2048);
    }

    #[test]
    fn missing_anchor() {
        let data = vec![0u8; 300 * SECTOR_SIZE];

        assert!(matches!(
            Volume::open(&data),
            Err(ReadError::UnexpectedTag {
                block: 256,
                expected: TAG_ANCHOR,
                found: 0
            })
        ));
    }
}
