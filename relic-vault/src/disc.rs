//! Disc images, with an optional defect map from the imaging run.

use crate::container::{Chunks, Container, Digest, LookupError, PathNotFoundSnafu};
use crate::defect::{self, DefectMapError, DefectRange};
use memmap2::Mmap;
use parking_lot::RwLock;
use relic_iso::facade::{Facade, FacadeKind, Node};
use sha2::{Digest as _, Sha256};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

use open_disc_error::*;

/// File name of the image inside a mount directory.
pub const IMAGE_FILE: &str = "cdimage";

/// File name of the optional defect map inside a mount directory.
pub const MAPFILE: &str = "mapfile";

/// Facades in the order they are preferred.
pub const FACADE_PRIORITY: [FacadeKind; 4] = [
    FacadeKind::Joliet,
    FacadeKind::RockRidge,
    FacadeKind::Udf,
    FacadeKind::Iso9660,
];

/// Streaming window size.
pub const CHUNK_SIZE: usize = 4096;

/// Version suffix appended to ISO 9660 file identifiers.
const VERSION_SUFFIX: &str = ";1";

#[derive(Debug, Snafu)]
#[snafu(module)]
#[non_exhaustive]
pub enum OpenDiscError {
    #[snafu(display("{} is not a directory", path.display()))]
    NotADirectory { path: PathBuf },

    #[snafu(display("{} is not a file", path.display()))]
    MissingImage { path: PathBuf },

    #[snafu(display("cannot open {}", path.display()))]
    OpenImageFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("cannot read defect map {}", path.display()))]
    ReadMapfileFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("invalid defect map {}", path.display()))]
    ParseMapfileFailed {
        path: PathBuf,
        source: DefectMapError,
    },

    #[snafu(display("cannot parse disc image"))]
    ParseImageFailed { source: relic_iso::OpenError },

    #[snafu(display("image has no usable facade"))]
    NoFacade,

    #[snafu(display("cannot list directory {path:?} through the {facade} facade"))]
    ListDirectoryFailed {
        path: String,
        facade: FacadeKind,
        source: relic_iso::facade::ReadError,
    },

    #[snafu(display("directory {path:?} points back at a directory already listed"))]
    DirectoryLoop { path: String },

    #[snafu(display("{path:?} spans {offset:#x}+{len}, past the end of the image"))]
    ExtentOutOfBounds { path: String, offset: u64, len: u64 },
}

/// An indexed path and the bytes it occupies in the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathEntry {
    offset: u64,
    len: u64,
    is_dir: bool,
}

impl PathEntry {
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub const fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Returns the half-open byte range `[offset, offset + len)`.
    #[must_use]
    pub const fn range(&self) -> std::ops::Range<u64> {
        self.offset..self.offset + self.len
    }

    /// Returns the extent in the closed form used for defect checks.
    fn closed(&self) -> DefectRange {
        DefectRange::new(self.offset, self.offset + self.len)
    }
}

/// A memory-mapped disc image with its path index.
///
/// The index is built when the image is opened and never changes. Digests
/// are computed lazily by [`stream()`](Container::stream) and kept for the
/// lifetime of the container.
pub struct DiscImage {
    image: PathBuf,
    map: Mmap,
    facade: FacadeKind,
    volume_id: String,
    index: BTreeMap<String, PathEntry>,
    defects: Vec<DefectRange>,
    errored: Vec<String>,
    checksums: RwLock<HashMap<String, Digest>>,
}

impl std::fmt::Debug for DiscImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscImage")
            .field("image", &self.image)
            .field("facade", &self.facade)
            .field("paths", &self.index.len())
            .field("defects", &self.defects.len())
            .field("errored", &self.errored.len())
            .finish_non_exhaustive()
    }
}

impl DiscImage {
    /// Opens a mount directory holding [`IMAGE_FILE`] and optionally
    /// [`MAPFILE`].
    pub fn open(dir: &Path) -> Result<Self, OpenDiscError> {
        ensure!(dir.is_dir(), NotADirectorySnafu { path: dir });

        let image = dir.join(IMAGE_FILE);
        ensure!(image.is_file(), MissingImageSnafu { path: &image });

        let mapfile = dir.join(MAPFILE);
        let mapfile = mapfile.is_file().then_some(mapfile);

        Self::open_files(&image, mapfile.as_deref())
    }

    /// Opens an image file and an optional defect map directly.
    pub fn open_files(image: &Path, mapfile: Option<&Path>) -> Result<Self, OpenDiscError> {
        let defects = match mapfile {
            Some(path) => {
                let text = std::fs::read_to_string(path).context(ReadMapfileFailedSnafu { path })?;
                defect::parse(&text).context(ParseMapfileFailedSnafu { path })?
            }
            None => Vec::new(),
        };

        let map = crate::map_file(image).context(OpenImageFailedSnafu { path: image })?;
        let (facade, volume_id, index) = build_index(&map)?;

        let errored: Vec<String> = index
            .iter()
            .filter(|(_, e)| !e.is_dir && defects.iter().any(|d| d.overlaps(&e.closed())))
            .map(|(p, _)| p.clone())
            .collect();

        for path in &errored {
            warn!(image = %image.display(), path = %path, "file overlaps a read defect");
        }

        info!(
            image = %image.display(),
            mapfile = ?mapfile.map(Path::display),
            %facade,
            volume_id = %volume_id,
            paths = index.len(),
            defects = defects.len(),
            errored = errored.len(),
            "opened disc image"
        );

        Ok(Self {
            image: image.to_path_buf(),
            map,
            facade,
            volume_id,
            index,
            defects,
            errored,
            checksums: RwLock::new(HashMap::new()),
        })
    }

    /// Returns the path of the image file.
    #[must_use]
    pub fn image_path(&self) -> &Path {
        &self.image
    }

    /// Returns the facade the index was built from.
    #[must_use]
    pub fn facade(&self) -> FacadeKind {
        self.facade
    }

    #[must_use]
    pub fn volume_id(&self) -> &str {
        &self.volume_id
    }

    /// Returns the bad ranges from the defect map.
    #[must_use]
    pub fn defects(&self) -> &[DefectRange] {
        &self.defects
    }

    /// Returns the files whose extent touches a defect range, sorted.
    ///
    /// Reads of these files are not affected; the list is for diagnostics.
    #[must_use]
    pub fn errored_paths(&self) -> &[String] {
        &self.errored
    }

    /// Looks up any indexed path, file or directory.
    #[must_use]
    pub fn entry(&self, path: &str) -> Option<&PathEntry> {
        self.index.get(path)
    }

    /// Returns the number of indexed files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.values().filter(|e| !e.is_dir).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every computed digest.
    pub fn clear_checksums(&self) {
        self.checksums.write().clear();
    }

    fn file(&self, path: &str) -> Result<&PathEntry, LookupError> {
        self.index
            .get(path)
            .filter(|e| !e.is_dir)
            .context(PathNotFoundSnafu { path })
    }
}

impl Container for DiscImage {
    fn exists(&self, path: &str) -> bool {
        self.file(path).is_ok()
    }

    fn size(&self, path: &str) -> Result<u64, LookupError> {
        Ok(self.file(path)?.len)
    }

    fn checksum(&self, path: &str) -> Result<Option<Digest>, LookupError> {
        self.file(path)?;

        Ok(self.checksums.read().get(path).copied())
    }

    fn stream(&self, path: &str) -> Result<Chunks<'_>, LookupError> {
        let entry = self.file(path)?;

        // Bounds were checked when the index was built.
        let start = entry.offset as usize;
        let end = start + entry.len as usize;
        let hasher = (!self.checksums.read().contains_key(path)).then(Sha256::new);

        Ok(Box::new(DiscStream {
            image: self,
            path: path.to_owned(),
            pos: start,
            end,
            hasher,
        }))
    }

    fn paths(&self) -> Vec<&str> {
        self.index
            .iter()
            .filter(|(_, e)| !e.is_dir)
            .map(|(p, _)| p.as_str())
            .collect()
    }

    fn close(self: Box<Self>) {
        debug!(image = %self.image.display(), "closing disc image");
    }
}

/// Fixed-size windows over a file's extent, hashing as they go when the
/// digest is not yet known.
struct DiscStream<'a> {
    image: &'a DiscImage,
    path: String,
    pos: usize,
    end: usize,
    hasher: Option<Sha256>,
}

impl<'a> Iterator for DiscStream<'a> {
    type Item = Cow<'a, [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            // Commit only after the last window went out.
            if let Some(hasher) = self.hasher.take() {
                let digest: Digest = hasher.finalize().into();

                trace!(path = %self.path, "caching checksum");
                self.image
                    .checksums
                    .write()
                    .entry(std::mem::take(&mut self.path))
                    .or_insert(digest);
            }

            return None;
        }

        let map: &'a [u8] = &self.image.map;
        let stop = self.end.min(self.pos + CHUNK_SIZE);
        let chunk = &map[self.pos..stop];
        self.pos = stop;

        if let Some(hasher) = &mut self.hasher {
            hasher.update(chunk);
        }

        Some(Cow::Borrowed(chunk))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.end - self.pos).div_ceil(CHUNK_SIZE);
        (n, Some(n))
    }
}

/// Lists every node reachable from the facade's root, depth first, as
/// `(path, node)` pairs. Paths are `/`-joined names; `.` and `..` are skipped.
///
/// Each directory extent is listed at most once; a directory whose extent was
/// already listed fails with [`OpenDiscError::DirectoryLoop`].
pub fn walk(facade: &dyn Facade) -> Result<Vec<(String, Node)>, OpenDiscError> {
    let kind = facade.kind();
    let root = facade.root().context(ListDirectoryFailedSnafu {
        path: "/",
        facade: kind,
    })?;

    let mut out = Vec::new();
    let mut listed = HashSet::from([root.offset()]);
    let mut stack = vec![(String::new(), root)];

    while let Some((path, dir)) = stack.pop() {
        let children = facade.list_children(&dir).context(ListDirectoryFailedSnafu {
            path: if path.is_empty() { "/" } else { path.as_str() },
            facade: kind,
        })?;

        for node in children {
            if node.is_dot() || node.is_dotdot() {
                continue;
            }

            let child = format!("{path}/{}", node.name());

            if node.is_dir() {
                ensure!(listed.insert(node.offset()), DirectoryLoopSnafu { path: &child });
                stack.push((child.clone(), node.clone()));
            }

            out.push((child, node));
        }
    }

    Ok(out)
}

fn build_index(
    data: &[u8],
) -> Result<(FacadeKind, String, BTreeMap<String, PathEntry>), OpenDiscError> {
    let iso = relic_iso::open_slice(data).context(ParseImageFailedSnafu)?;
    let (kind, facade) = FACADE_PRIORITY
        .iter()
        .find_map(|&k| iso.facade(k).map(|f| (k, f)))
        .context(NoFacadeSnafu)?;

    let mut index = BTreeMap::new();

    for (path, node) in walk(&*facade)? {
        let end = node.offset().checked_add(node.len());

        ensure!(
            end.is_some_and(|e| e <= data.len() as u64),
            ExtentOutOfBoundsSnafu {
                path: &path,
                offset: node.offset(),
                len: node.len(),
            }
        );

        let path = if node.is_dir() {
            path
        } else {
            path.strip_suffix(VERSION_SUFFIX)
                .map(str::to_owned)
                .unwrap_or(path)
        };

        index.insert(
            path,
            PathEntry {
                offset: node.offset(),
                len: node.len(),
                is_dir: node.is_dir(),
            },
        );
    }

    Ok((kind, iso.volume_id().to_owned(), index))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use relic_iso::builder::ImageBuilder;

    #[test]
    fn index_strips_version_suffix() {
        let data = ImageBuilder::new().file("foo/bar.txt", b"abc").build();
        let (kind, volume_id, index) = build_index(&data).unwrap();

        assert_eq!(kind, FacadeKind::Iso9660);
        assert_eq!(volume_id, "RELIC");
        assert!(index.contains_key("/FOO/BAR.TXT"));
        assert!(index["/FOO"].is_dir());
        assert!(!index.contains_key("/FOO/BAR.TXT;1"));
    }

    #[test]
    fn walk_skips_pseudo_entries() {
        let data = ImageBuilder::new().dir("a/b").build();
        let iso = relic_iso::open_slice(&data).unwrap();
        let facade = iso.facade(FacadeKind::Iso9660).unwrap();

        let mut paths: Vec<_> = walk(&*facade).unwrap().into_iter().map(|(p, _)| p).collect();
        paths.sort();

        assert_eq!(paths, vec!["/A", "/A/B"]);
    }
}
