//! A library for reading the directory trees of ISO 9660 optical-disc images.
//!
//! A single image can carry several naming layers over the same data: the
//! plain ISO 9660 hierarchy, a Joliet supplementary hierarchy with UCS-2 names,
//! Rock Ridge POSIX names on the primary hierarchy, and a UDF file set on
//! bridge discs. Each layer is exposed as a [`Facade`] that lists directory
//! children; callers decide how to walk the tree.
//!
//! # Example
//!
//! ```no_run
//! use relic_iso::facade::{Facade, FacadeKind};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = std::fs::read("cdimage")?;
//! let iso = relic_iso::open_slice(&data)?;
//!
//! if let Some(joliet) = iso.facade(FacadeKind::Joliet) {
//!     let root = joliet.root()?;
//!
//!     for node in joliet.list_children(&root)? {
//!         println!("{}", node.name());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use self::directory::{DirectoryFacade, Naming};
use self::facade::{Facade, FacadeKind};
use self::record::DirectoryRecord;
use self::volume::RootExtent;
use snafu::{OptionExt, ResultExt, Snafu, ensure};

#[cfg(any(test, feature = "builder"))]
pub mod builder;
pub mod directory;
pub mod facade;
mod record;
mod susp;
pub mod udf;
pub mod volume;

pub use self::record::FileFlags;

/// Size of a logical sector. Volume descriptors always occupy one sector each.
pub const SECTOR_SIZE: usize = 2048;

/// Errors for [`open_slice()`].
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum OpenError {
    #[snafu(display("cannot read volume descriptors"))]
    ReadVolumeDescriptors { source: volume::ReadError },

    #[snafu(display("no primary volume descriptor"))]
    NoPrimaryDescriptor,

    #[snafu(display("invalid logical block size {block_size}"))]
    InvalidBlockSize { block_size: u16 },

    #[snafu(display("cannot read system use area of the root directory"))]
    DetectRockRidge { source: facade::ReadError },

    #[snafu(display("cannot read UDF volume structures"))]
    ReadUdfVolume { source: facade::ReadError },
}

/// An opened disc image borrowing its bytes.
///
/// Holds what was learned from the descriptors; directory data is only read
/// when a facade lists it.
#[must_use]
pub struct Iso<'a> {
    data: &'a [u8],
    block_size: u64,
    primary: RootExtent,
    joliet: Option<RootExtent>,
    rock_ridge: Option<u8>,
    udf: Option<udf::Volume>,
    volume_id: String,
    space_size: u32,
}

impl std::fmt::Debug for Iso<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Iso")
            .field("volume_id", &self.volume_id)
            .field("block_size", &self.block_size)
            .field("joliet", &self.joliet.is_some())
            .field("rock_ridge", &self.rock_ridge.is_some())
            .field("udf", &self.udf.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> Iso<'a> {
    #[must_use]
    pub fn has_joliet(&self) -> bool {
        self.joliet.is_some()
    }

    #[must_use]
    pub fn has_rock_ridge(&self) -> bool {
        self.rock_ridge.is_some()
    }

    #[must_use]
    pub fn has_udf(&self) -> bool {
        self.udf.is_some()
    }

    /// Returns the volume identifier with trailing padding removed.
    #[must_use]
    pub fn volume_id(&self) -> &str {
        &self.volume_id
    }

    /// Returns the volume size in logical blocks as recorded in the primary
    /// descriptor.
    #[must_use]
    pub fn space_size(&self) -> u32 {
        self.space_size
    }

    /// Returns the logical block size of the ISO 9660 hierarchies.
    #[must_use]
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Returns the image bytes.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the facades present on this image.
    pub fn facades(&self) -> impl Iterator<Item = FacadeKind> + '_ {
        [
            FacadeKind::Joliet,
            FacadeKind::RockRidge,
            FacadeKind::Udf,
            FacadeKind::Iso9660,
        ]
        .into_iter()
        .filter(|&kind| match kind {
            FacadeKind::Joliet => self.has_joliet(),
            FacadeKind::RockRidge => self.has_rock_ridge(),
            FacadeKind::Udf => self.has_udf(),
            FacadeKind::Iso9660 => true,
        })
    }

    /// Returns the facade of the given kind, or `None` if the image does not
    /// carry it. [`FacadeKind::Iso9660`] is always available.
    pub fn facade(&self, kind: FacadeKind) -> Option<Box<dyn Facade + '_>> {
        let primary = (self.primary.block, self.primary.len);

        match kind {
            FacadeKind::Joliet => self.joliet.map(|root| {
                Box::new(DirectoryFacade::new(self, (root.block, root.len), Naming::Joliet))
                    as Box<dyn Facade + '_>
            }),
            FacadeKind::RockRidge => self.rock_ridge.map(|skip| {
                Box::new(DirectoryFacade::new(self, primary, Naming::RockRidge { skip }))
                    as Box<dyn Facade + '_>
            }),
            FacadeKind::Udf => self
                .udf
                .map(|volume| Box::new(udf::UdfFacade::new(self.data, volume)) as Box<dyn Facade + '_>),
            FacadeKind::Iso9660 => Some(Box::new(DirectoryFacade::new(
                self,
                primary,
                Naming::Plain,
            ))),
        }
    }
}

/// Opens a disc image from a byte slice.
///
/// Reads the volume descriptor set starting at sector 16, probes the root
/// directory for the Rock Ridge indicator and follows the UDF anchor when the
/// volume recognition sequence announces one.
///
/// # Errors
///
/// Returns an [`OpenError`] if the descriptors are missing or malformed, or if
/// an announced UDF volume cannot be located.
pub fn open_slice(data: &[u8]) -> Result<Iso<'_>, OpenError> {
    let set = volume::read_descriptor_set(data).context(ReadVolumeDescriptorsSnafu)?;
    let primary = set.primary.context(NoPrimaryDescriptorSnafu)?;
    let block_size = primary.block_size;

    ensure!(
        block_size >= 512 && block_size.is_power_of_two(),
        InvalidBlockSizeSnafu { block_size }
    );

    let block_size = block_size as u64;
    let rock_ridge = detect_rock_ridge(data, primary.root, block_size)?;

    let udf = if set.udf {
        Some(udf::Volume::open(data).context(ReadUdfVolumeSnafu)?)
    } else {
        None
    };

    Ok(Iso {
        data,
        block_size,
        primary: primary.root,
        joliet: set.joliet,
        rock_ridge,
        udf,
        volume_id: primary.volume_id,
        space_size: primary.space_size,
    })
}

/// Reads the `.` record of the primary root and looks for `SP` plus a Rock
/// Ridge entry in its system use area.
fn detect_rock_ridge(data: &[u8], root: RootExtent, block_size: u64) -> Result<Option<u8>, OpenError> {
    let offset = root.block * block_size;
    let dir = facade::extent(data, offset, root.len).context(DetectRockRidgeSnafu)?;

    if dir.first().is_none_or(|&len| len == 0) {
        return Ok(None);
    }

    let dot = DirectoryRecord::parse(dir, offset).context(DetectRockRidgeSnafu)?;
    let entries = susp::entries(data, dot.system_use(), block_size).context(DetectRockRidgeSnafu)?;

    Ok(susp::detect_rock_ridge(&entries))
}
