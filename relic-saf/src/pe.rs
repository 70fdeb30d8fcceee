//! The parts of a PE image needed to find where its on-disk sections end.

use snafu::{OptionExt, Snafu, ensure};
use zerocopy::{
    FromBytes, Immutable, KnownLayout, Unaligned,
    little_endian::{U16, U32},
};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ReadError {
    #[snafu(display("missing MZ signature"))]
    NotExecutable,

    #[snafu(display("PE header offset {offset:#x} is outside the file"))]
    InvalidHeaderOffset { offset: u32 },

    #[snafu(display("missing PE signature at {offset:#x}"))]
    NotPe { offset: u32 },

    #[snafu(display("section table at {offset:#x} with {count} entries is outside the file"))]
    SectionTableOutOfBounds { offset: usize, count: u16 },
}

#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct DosHeaderRaw {
    magic: [u8; 2],     // 0x00
    _unused: [u8; 58],  // 0x02
    e_lfanew: U32,      // 0x3C
}

#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct FileHeaderRaw {
    signature: [u8; 4],            // 0x00
    _machine: U16,                 // 0x04
    number_of_sections: U16,       // 0x06
    _time_date_stamp: U32,         // 0x08
    _pointer_to_symbol_table: U32, // 0x0C
    _number_of_symbols: U32,       // 0x10
    size_of_optional_header: U16,  // 0x14
    _characteristics: U16,         // 0x16
}

#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct SectionHeaderRaw {
    name: [u8; 8],                // 0x00
    virtual_size: U32,            // 0x08
    virtual_address: U32,         // 0x0C
    size_of_raw_data: U32,        // 0x10
    pointer_to_raw_data: U32,     // 0x14
    _pointer_to_relocations: U32, // 0x18
    _pointer_to_linenumbers: U32, // 0x1C
    _number_of_relocations: U16,  // 0x20
    _number_of_linenumbers: U16,  // 0x22
    _characteristics: U32,        // 0x24
}

/// A section header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub virtual_address: u32,
    pub virtual_size: u32,
    pub raw_offset: u32,
    pub raw_size: u32,
}

impl Section {
    /// Returns the first file offset past this section's data.
    #[must_use]
    pub fn raw_end(&self) -> u64 {
        self.raw_offset as u64 + self.raw_size as u64
    }
}

/// Reads the section table.
pub fn sections(data: &[u8]) -> Result<Vec<Section>, ReadError> {
    let (dos, _) = DosHeaderRaw::ref_from_prefix(data).map_err(|_| NotExecutableSnafu.build())?;

    ensure!(&dos.magic == b"MZ", NotExecutableSnafu);

    let offset = dos.e_lfanew.get();
    let rest = data
        .get(offset as usize..)
        .context(InvalidHeaderOffsetSnafu { offset })?;
    let (file, _) =
        FileHeaderRaw::ref_from_prefix(rest).map_err(|_| InvalidHeaderOffsetSnafu { offset }.build())?;

    ensure!(&file.signature == b"PE\0\0", NotPeSnafu { offset });

    let count = file.number_of_sections.get();
    let table = offset as usize + size_of::<FileHeaderRaw>() + file.size_of_optional_header.get() as usize;
    let headers = data
        .get(table..)
        .and_then(|d| <[SectionHeaderRaw]>::ref_from_prefix_with_elems(d, count as usize).ok())
        .map(|(headers, _)| headers)
        .context(SectionTableOutOfBoundsSnafu {
            offset: table,
            count,
        })?;

    Ok(headers
        .iter()
        .map(|h| {
            let len = h.name.iter().position(|&c| c == 0).unwrap_or(8);

            Section {
                name: String::from_utf8_lossy(&h.name[..len]).into_owned(),
                virtual_address: h.virtual_address.get(),
                virtual_size: h.virtual_size.get(),
                raw_offset: h.pointer_to_raw_data.get(),
                raw_size: h.size_of_raw_data.get(),
            }
        })
        .collect())
}

/// Returns the first byte past the last section's on-disk data, the offset at
/// which data appended to the executable begins.
pub fn exe_eof(data: &[u8]) -> Result<u64, ReadError> {
    Ok(sections(data)?
        .iter()
        .map(Section::raw_end)
        .max()
        .unwrap_or(0))
}
