//! SAF trailer archives appended to executables.

use crate::container::{Chunks, Container, Digest, LookupError, PathNotFoundSnafu, ReadFailedSnafu};
use memmap2::Mmap;
use relic_saf::Archive;
use relic_saf::entry::ArchiveEntry;
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use open_archive_error::*;

#[derive(Debug, Snafu)]
#[snafu(module)]
#[non_exhaustive]
pub enum OpenArchiveError {
    #[snafu(display("{} is not a file", path.display()))]
    NotAFile { path: PathBuf },

    #[snafu(display("cannot open {}", path.display()))]
    OpenExecutableFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("cannot parse the archive in {}", path.display()))]
    ParseArchiveFailed {
        path: PathBuf,
        source: relic_saf::OpenError,
    },
}

/// An executable with a SAF trailer.
///
/// Every entry was inflated and hashed when the archive was opened, so
/// digests are always available.
pub struct ArchiveContainer {
    exe: PathBuf,
    archive: Archive<Mmap>,
}

impl std::fmt::Debug for ArchiveContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveContainer")
            .field("exe", &self.exe)
            .field("archive", &self.archive)
            .finish()
    }
}

impl ArchiveContainer {
    pub fn open(exe: &Path) -> Result<Self, OpenArchiveError> {
        ensure!(exe.is_file(), NotAFileSnafu { path: exe });

        let map = crate::map_file(exe).context(OpenExecutableFailedSnafu { path: exe })?;
        let archive = Archive::new(map).context(ParseArchiveFailedSnafu { path: exe })?;

        info!(
            exe = %exe.display(),
            exe_eof = archive.exe_eof(),
            entries = archive.len(),
            "opened archive"
        );

        Ok(Self {
            exe: exe.to_path_buf(),
            archive,
        })
    }

    #[must_use]
    pub fn exe_path(&self) -> &Path {
        &self.exe
    }

    /// Returns the offset at which the trailer starts.
    #[must_use]
    pub fn exe_eof(&self) -> u64 {
        self.archive.exe_eof()
    }

    #[must_use]
    pub fn entry(&self, path: &str) -> Option<&ArchiveEntry> {
        self.archive.entry(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }

    fn file(&self, path: &str) -> Result<&ArchiveEntry, LookupError> {
        self.archive.entry(path).context(PathNotFoundSnafu { path })
    }
}

impl Container for ArchiveContainer {
    fn exists(&self, path: &str) -> bool {
        self.archive.entry(path).is_some()
    }

    fn size(&self, path: &str) -> Result<u64, LookupError> {
        Ok(self.file(path)?.len())
    }

    fn checksum(&self, path: &str) -> Result<Option<Digest>, LookupError> {
        Ok(Some(*self.file(path)?.digest()))
    }

    fn stream(&self, path: &str) -> Result<Chunks<'_>, LookupError> {
        let entry = self.file(path)?;
        let data = self
            .archive
            .entry_data(entry)
            .context(ReadFailedSnafu { path })?;

        Ok(Box::new(std::iter::once(Cow::Owned(data))))
    }

    fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.archive.paths().collect();
        paths.sort_unstable();
        paths
    }

    fn close(self: Box<Self>) {
        debug!(exe = %self.exe.display(), "closing archive");
    }
}
