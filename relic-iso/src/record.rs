use crate::SECTOR_SIZE;
use crate::facade::{InvalidRecordSnafu, ReadError};
use snafu::ensure;
use zerocopy::{
    FromBytes, Immutable, KnownLayout, Unaligned,
    little_endian::U32,
};

/// Fixed part of an ISO 9660 directory record (33 bytes).
///
/// Both-endian fields keep only the little-endian half typed; the big-endian
/// copy is ignored.
#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub(crate) struct DirectoryRecordRaw {
    len: u8,                  // 0x00
    ext_attr_len: u8,         // 0x01
    extent: U32,              // 0x02
    _extent_be: [u8; 4],      // 0x06
    data_len: U32,            // 0x0A
    _data_len_be: [u8; 4],    // 0x0E
    _recorded: [u8; 7],       // 0x12
    flags: u8,                // 0x19
    _unit_size: u8,           // 0x1A
    _interleave_gap: u8,      // 0x1B
    _volume_seq: [u8; 4],     // 0x1C
    name_len: u8,             // 0x20
}

bitflags::bitflags! {
    /// File flags of a directory record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileFlags: u8 {
        const HIDDEN = 0x01;
        const DIRECTORY = 0x02;
        const ASSOCIATED = 0x04;
        const RECORD = 0x08;
        const PROTECTION = 0x10;
        const MULTI_EXTENT = 0x80;
    }
}

/// A parsed directory record borrowing from the image.
pub(crate) struct DirectoryRecord<'a> {
    raw: &'a DirectoryRecordRaw,
    identifier: &'a [u8],
    system_use: &'a [u8],
}

impl<'a> DirectoryRecord<'a> {
    pub const FIXED_LEN: usize = size_of::<DirectoryRecordRaw>();

    /// Parses one record from the start of `data`.
    ///
    /// `offset` is the image position of `data`, used for error reporting.
    pub fn parse(data: &'a [u8], offset: u64) -> Result<Self, ReadError> {
        let (raw, _) = DirectoryRecordRaw::ref_from_prefix(data)
            .map_err(|_| InvalidRecordSnafu { offset }.build())?;

        let len = raw.len as usize;
        let name_len = raw.name_len as usize;

        ensure!(
            len >= Self::FIXED_LEN + name_len && len <= data.len(),
            InvalidRecordSnafu { offset }
        );

        let identifier = &data[Self::FIXED_LEN..Self::FIXED_LEN + name_len];

        // A padding byte follows identifiers of even length.
        let su_start = Self::FIXED_LEN + name_len + (1 - name_len % 2);
        let system_use = data.get(su_start..len).unwrap_or(&[]);

        Ok(Self {
            raw,
            identifier,
            system_use,
        })
    }

    pub fn len(&self) -> usize {
        self.raw.len as usize
    }

    /// Returns the first logical block of the data, after any extended
    /// attribute record.
    pub fn data_block(&self) -> u64 {
        self.raw.extent.get() as u64 + self.raw.ext_attr_len as u64
    }

    pub fn data_len(&self) -> u64 {
        self.raw.data_len.get() as u64
    }

    pub fn flags(&self) -> FileFlags {
        FileFlags::from_bits_retain(self.raw.flags)
    }

    pub fn is_dir(&self) -> bool {
        self.flags().contains(FileFlags::DIRECTORY)
    }

    pub fn identifier(&self) -> &'a [u8] {
        self.identifier
    }

    pub fn system_use(&self) -> &'a [u8] {
        self.system_use
    }

    pub fn is_current(&self) -> bool {
        self.identifier == [0]
    }

    pub fn is_parent(&self) -> bool {
        self.identifier == [1]
    }
}

/// Iterator over the records of a directory extent.
///
/// Records never straddle a sector; a zero length byte means the rest of the
/// sector is padding.
pub(crate) struct Records<'a> {
    data: &'a [u8],
    base: u64,
    pos: usize,
}

impl<'a> Records<'a> {
    pub fn new(data: &'a [u8], base: u64) -> Self {
        Self { data, base, pos: 0 }
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<DirectoryRecord<'a>, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let rest = self.data.get(self.pos..)?;
            let &len = rest.first()?;

            if len == 0 {
                self.pos = (self.pos / SECTOR_SIZE + 1) * SECTOR_SIZE;
                continue;
            }

            let offset = self.base + self.pos as u64;

            return Some(match DirectoryRecord::parse(rest, offset) {
                Ok(record) => {
                    self.pos += record.len();
                    Ok(record)
                }
                Err(e) => {
                    self.pos = self.data.len();
                    Err(e)
                }
            });
        }
    }
}
