//! Read-only, path-addressed access to the files inside preserved media.
//!
//! Two container formats are supported behind the [`Container`] trait:
//!
//! - [`DiscImage`]: an optical disc image (ISO 9660 with optional Joliet,
//!   Rock Ridge and UDF layers) plus an optional ddrescue defect map. Files
//!   are streamed from the memory-mapped image and their SHA-256 digests are
//!   computed on first full read.
//! - [`ArchiveContainer`]: a SAF trailer appended to a PE executable. Every
//!   entry is inflated and hashed when the archive is opened.
//!
//! # Example
//!
//! ```no_run
//! use relic_vault::{Container, Kind, open_container};
//!
//! let disc = open_container(Kind::Iso, "discs/game1".as_ref()).unwrap();
//!
//! for path in disc.paths() {
//!     println!("{path} {}", disc.size(path).unwrap());
//! }
//! ```
//!
//! A [`Registry`] holds one container per configured prefix and swaps in a
//! new generation atomically on [`reload`](Registry::reload).

pub mod archive;
pub mod config;
pub mod container;
pub mod defect;
pub mod disc;
pub mod progress;
pub mod registry;
pub mod verify;

pub use self::archive::{ArchiveContainer, OpenArchiveError};
pub use self::config::{Config, ConfigError, DiskConfig, Kind, Player};
pub use self::container::{Chunks, Container, Digest, LookupError, content_digest_header};
pub use self::disc::{DiscImage, OpenDiscError};
pub use self::progress::{SilentProgress, VerifyProgress};
pub use self::registry::{Mount, Registry};
pub use self::verify::{Verified, VerifyError, verify};

#[cfg(feature = "cli")]
pub use self::progress::ConsoleProgress;

use memmap2::Mmap;
use snafu::{ResultExt, Snafu};
use std::fs::File;
use std::path::Path;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum OpenError {
    #[snafu(display("cannot open disc image"))]
    OpenDiscFailed { source: OpenDiscError },

    #[snafu(display("cannot open archive"))]
    OpenArchiveFailed { source: OpenArchiveError },
}

/// Opens `target` as a container of the given kind.
///
/// `target` is the mount directory for [`Kind::Iso`] and the executable for
/// [`Kind::Swfkit`].
pub fn open_container(kind: Kind, target: &Path) -> Result<Box<dyn Container>, OpenError> {
    let container: Box<dyn Container> = match kind {
        Kind::Iso => Box::new(DiscImage::open(target).context(OpenDiscFailedSnafu)?),
        Kind::Swfkit => Box::new(ArchiveContainer::open(target).context(OpenArchiveFailedSnafu)?),
    };

    Ok(container)
}

/// Maps a whole file read-only.
pub(crate) fn map_file(path: &Path) -> std::io::Result<Mmap> {
    let file = File::open(path)?;

    // SAFETY: containers are opened over preserved media that is never
    // modified while mounted. Truncating the file underneath the mapping is
    // outside what this crate supports.
    unsafe { Mmap::map(&file) }
}
