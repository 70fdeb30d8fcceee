/// One file stored in the trailer archive.
///
/// Everything here is fixed when the archive is opened; the payload was
/// inflated once to learn its length and digest.
#[derive(Clone, PartialEq, Eq)]
#[must_use]
pub struct ArchiveEntry {
    pub(crate) name: String,
    pub(crate) offset: u64,
    pub(crate) compressed_len: u64,
    pub(crate) len: u64,
    pub(crate) digest: [u8; 32],
    pub(crate) meta: [u8; 8],
}

impl std::fmt::Debug for ArchiveEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveEntry")
            .field("name", &self.name)
            .field("offset", &format_args!("{:#x}", self.offset))
            .field("compressed_len", &self.compressed_len)
            .field("len", &self.len)
            .field("digest", &hex::encode(self.digest))
            .finish_non_exhaustive()
    }
}

impl ArchiveEntry {
    /// Returns the stored file name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the path the entry is addressed by (`/` + name).
    #[must_use]
    pub fn path(&self) -> String {
        format!("/{}", self.name)
    }

    /// Returns the file offset of the compressed payload.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    #[must_use]
    pub const fn compressed_len(&self) -> u64 {
        self.compressed_len
    }

    /// Returns the inflated length.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the SHA-256 of the inflated payload.
    #[must_use]
    pub const fn digest(&self) -> &[u8; 32] {
        &self.digest
    }

    /// Returns the 8 bytes following the payload. Their meaning is unknown.
    #[must_use]
    pub const fn meta(&self) -> &[u8; 8] {
        &self.meta
    }
}
