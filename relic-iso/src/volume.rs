use crate::SECTOR_SIZE;
use crate::record::DirectoryRecord;
use snafu::{ResultExt, Snafu};
use zerocopy::{
    FromBytes, Immutable, KnownLayout, Unaligned,
    little_endian::{U16, U32},
};

/// Errors when reading the volume descriptor set.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ReadError {
    #[snafu(display("image is too small to hold a volume descriptor set"))]
    TooSmall,

    #[snafu(display("invalid root directory record in descriptor at sector #{sector}"))]
    InvalidRootRecord {
        sector: u64,
        source: crate::facade::ReadError,
    },
}

/// The volume descriptor set starts at sector 16.
pub(crate) const FIRST_DESCRIPTOR_SECTOR: u64 = 16;

/// Upper bound on descriptors scanned before giving up on a terminator.
const MAX_DESCRIPTORS: u64 = 64;

const TYPE_PRIMARY: u8 = 1;
const TYPE_SUPPLEMENTARY: u8 = 2;

/// Joliet UCS-2 levels 1 to 3.
const JOLIET_ESCAPES: [&[u8; 3]; 3] = [b"%/@", b"%/C", b"%/E"];

/// Leading fields of a primary or supplementary volume descriptor.
#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct VolumeDescriptorRaw {
    ty: u8,                   // 0x00
    identifier: [u8; 5],      // 0x01
    version: u8,              // 0x06
    _flags: u8,               // 0x07
    _system_id: [u8; 32],     // 0x08
    volume_id: [u8; 32],      // 0x28
    _unused: [u8; 8],         // 0x48
    space_size: U32,          // 0x50
    _space_size_be: [u8; 4],  // 0x54
    escapes: [u8; 32],        // 0x58
    _set_size: [u8; 4],       // 0x78
    _sequence: [u8; 4],       // 0x7C
    block_size: U16,          // 0x80
    _block_size_be: [u8; 2],  // 0x82
    _path_table: [u8; 24],    // 0x84
    root_record: [u8; 34],    // 0x9C
}

/// Location of a directory tree's root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RootExtent {
    pub block: u64,
    pub len: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct Primary {
    pub root: RootExtent,
    pub block_size: u16,
    pub space_size: u32,
    pub volume_id: String,
}

/// Everything learned from scanning sectors 16 onwards.
#[derive(Debug, Default)]
pub(crate) struct DescriptorSet {
    pub primary: Option<Primary>,
    pub joliet: Option<RootExtent>,
    /// An `NSR02`/`NSR03` descriptor was found in the volume recognition
    /// sequence.
    pub udf: bool,
}

/// Scans the ISO 9660 descriptor set and the UDF volume recognition sequence
/// that follows it.
pub(crate) fn read_descriptor_set(data: &[u8]) -> Result<DescriptorSet, ReadError> {
    let mut set = DescriptorSet::default();

    if data.len() < ((FIRST_DESCRIPTOR_SECTOR as usize) + 1) * SECTOR_SIZE {
        return TooSmallSnafu.fail();
    }

    for sector in FIRST_DESCRIPTOR_SECTOR..FIRST_DESCRIPTOR_SECTOR + MAX_DESCRIPTORS {
        let start = sector as usize * SECTOR_SIZE;
        let Some(buf) = data.get(start..start + SECTOR_SIZE) else {
            break;
        };

        let Ok((raw, _)) = VolumeDescriptorRaw::ref_from_prefix(buf) else {
            break;
        };

        match &raw.identifier {
            b"CD001" => match raw.ty {
                TYPE_PRIMARY if set.primary.is_none() && raw.version == 1 => {
                    let root = root_extent(raw, sector)?;

                    set.primary = Some(Primary {
                        root,
                        block_size: raw.block_size.get(),
                        space_size: raw.space_size.get(),
                        volume_id: String::from_utf8_lossy(&raw.volume_id)
                            .trim_end()
                            .to_owned(),
                    });
                }
                TYPE_SUPPLEMENTARY if set.joliet.is_none() && is_joliet(&raw.escapes) => {
                    set.joliet = Some(root_extent(raw, sector)?);
                }
                _ => {}
            },
            b"NSR02" | b"NSR03" => set.udf = true,
            b"BEA01" | b"TEA01" | b"BOOT2" | b"CDW02" => {}
            _ => break,
        }
    }

    Ok(set)
}

fn root_extent(raw: &VolumeDescriptorRaw, sector: u64) -> Result<RootExtent, ReadError> {
    let offset = sector * SECTOR_SIZE as u64 + 0x9C;
    let record =
        DirectoryRecord::parse(&raw.root_record, offset).context(InvalidRootRecordSnafu { sector })?;

    Ok(RootExtent {
        block: record.data_block(),
        len: record.data_len(),
    })
}

fn is_joliet(escapes: &[u8; 32]) -> bool {
    JOLIET_ESCAPES.iter().any(|e| escapes.starts_with(*e))
}
