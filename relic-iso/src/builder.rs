//! In-memory image builder for tests.
//!
//! Produces small but well-formed images: a primary hierarchy, and optionally
//! a Joliet hierarchy, Rock Ridge names and a UDF file set over the same file
//! data.

use crate::SECTOR_SIZE;
use std::collections::{BTreeMap, HashMap};

const FLAG_DIRECTORY: u8 = 0x02;

enum Entry {
    Dir,
    File { content: Vec<u8>, lba: Option<u32> },
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum Hierarchy {
    Primary,
    Joliet,
}

/// Builds a disc image from a list of paths.
///
/// Parent directories are created implicitly. Files are placed after the
/// descriptors unless [`file_at`](Self::file_at) pins them to a block.
pub struct ImageBuilder {
    entries: BTreeMap<String, Entry>,
    joliet: bool,
    rock_ridge: bool,
    udf: bool,
    volume_id: String,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            joliet: false,
            rock_ridge: false,
            udf: false,
            volume_id: "RELIC".to_owned(),
        }
    }

    pub fn file(self, path: &str, content: &[u8]) -> Self {
        self.insert_file(path, content, None)
    }

    /// Adds a file whose data starts at logical block `lba`. The caller keeps
    /// pinned files clear of each other and of sectors 16 onwards.
    pub fn file_at(self, path: &str, lba: u32, content: &[u8]) -> Self {
        self.insert_file(path, content, Some(lba))
    }

    pub fn dir(mut self, path: &str) -> Self {
        let path = path.trim_matches('/').to_owned();
        self.add_parents(&path);
        self.entries.insert(path, Entry::Dir);
        self
    }

    pub fn joliet(mut self, enabled: bool) -> Self {
        self.joliet = enabled;
        self
    }

    pub fn rock_ridge(mut self, enabled: bool) -> Self {
        self.rock_ridge = enabled;
        self
    }

    pub fn udf(mut self, enabled: bool) -> Self {
        self.udf = enabled;
        self
    }

    pub fn volume_id(mut self, id: &str) -> Self {
        self.volume_id = id.to_owned();
        self
    }

    fn insert_file(mut self, path: &str, content: &[u8], lba: Option<u32>) -> Self {
        let path = path.trim_matches('/').to_owned();
        self.add_parents(&path);
        self.entries.insert(
            path,
            Entry::File {
                content: content.to_vec(),
                lba,
            },
        );
        self
    }

    fn add_parents(&mut self, path: &str) {
        let mut parent = parent_of(path);

        while !parent.is_empty() {
            self.entries.entry(parent.to_owned()).or_insert(Entry::Dir);
            parent = parent_of(parent);
        }
    }

    /// Directories including the root (`""`), parents before children.
    fn dirs(&self) -> Vec<&str> {
        std::iter::once("")
            .chain(
                self.entries
                    .iter()
                    .filter(|(_, e)| matches!(e, Entry::Dir))
                    .map(|(p, _)| p.as_str()),
            )
            .collect()
    }

    fn children(&self, dir: &str) -> Vec<(&str, &Entry)> {
        self.entries
            .iter()
            .filter(|(p, _)| parent_of(p) == dir)
            .map(|(p, e)| (p.as_str(), e))
            .collect()
    }

    pub fn build(self) -> Vec<u8> {
        let mut next: u32 = if self.udf { 257 } else { 32 };
        let mut alloc = |bytes: usize| {
            let lba = next;
            next += bytes.div_ceil(SECTOR_SIZE).max(1) as u32;
            lba
        };

        // File data, shared by every hierarchy.
        let mut files: HashMap<&str, (u32, &[u8])> = HashMap::new();
        let mut end = 0u32;

        for (path, entry) in &self.entries {
            if let Entry::File { content, lba } = entry {
                let lba = lba.unwrap_or_else(|| alloc(content.len()));
                end = end.max(lba + content.len().div_ceil(SECTOR_SIZE) as u32);
                files.insert(path.as_str(), (lba, content.as_slice()));
            }
        }

        // Directory extents; record sizes do not depend on locations.
        let mut hierarchies = vec![Hierarchy::Primary];
        if self.joliet {
            hierarchies.push(Hierarchy::Joliet);
        }

        let mut extents: HashMap<(Hierarchy, String), (u32, u32)> = HashMap::new();

        for &h in &hierarchies {
            for dir in self.dirs() {
                let probe = self.dir_records(h, dir, &files, &|_: &str| (0, 0));
                let len = layout(&probe).len().div_ceil(SECTOR_SIZE).max(1) * SECTOR_SIZE;
                extents.insert((h, dir.to_owned()), (alloc(len), len as u32));
            }
        }

        // UDF structures.
        let udf = self.udf.then(|| {
            let vds = alloc(3 * SECTOR_SIZE);
            let fsd = alloc(SECTOR_SIZE);
            let mut entries = HashMap::new();

            for dir in self.dirs() {
                let fids = self.fids(dir, &|_: &str| 0);
                entries.insert(dir, (alloc(SECTOR_SIZE), alloc(fids.len()), fids.len()));
            }

            for path in files.keys() {
                entries.insert(*path, (alloc(SECTOR_SIZE), 0, 0));
            }

            (vds, fsd, entries)
        });

        let total = next.max(end).max(if self.udf { 257 } else { 18 });
        let mut data = vec![0u8; total as usize * SECTOR_SIZE];

        // Volume descriptors.
        let mut sector = 16;
        let root = extents[&(Hierarchy::Primary, String::new())];
        write_descriptor(&mut data, sector, 1, &self.volume_id, total, root, None);
        sector += 1;

        if self.joliet {
            let root = extents[&(Hierarchy::Joliet, String::new())];
            write_descriptor(&mut data, sector, 2, &self.volume_id, total, root, Some(b"%/E"));
            sector += 1;
        }

        write_marker(&mut data, sector, 255, b"CD001");
        sector += 1;

        if self.udf {
            for id in [b"BEA01", b"NSR02", b"TEA01"] {
                write_marker(&mut data, sector, 0, id);
                sector += 1;
            }
        }

        // Directory hierarchies.
        for &h in &hierarchies {
            let locate = |path: &str| extents[&(h, path.to_owned())];

            for dir in self.dirs() {
                let (lba, _) = locate(dir);
                let bytes = layout(&self.dir_records(h, dir, &files, &locate));
                put(&mut data, lba as usize * SECTOR_SIZE, &bytes);
            }
        }

        for (lba, content) in files.values() {
            put(&mut data, *lba as usize * SECTOR_SIZE, content);
        }

        if let Some((vds, fsd, entries)) = udf {
            write_udf(&self, &mut data, vds, fsd, &entries, &files);
        }

        data
    }

    fn dir_records(
        &self,
        h: Hierarchy,
        dir: &str,
        files: &HashMap<&str, (u32, &[u8])>,
        locate: &dyn Fn(&str) -> (u32, u32),
    ) -> Vec<Vec<u8>> {
        let rock_ridge = self.rock_ridge && h == Hierarchy::Primary;
        let (lba, len) = locate(dir);
        let (parent_lba, parent_len) = locate(parent_of(dir));

        let dot_su = if rock_ridge && dir.is_empty() {
            [b"SP\x07\x01\xBE\xEF\x00".as_slice(), b"RR\x05\x01\x08"].concat()
        } else {
            Vec::new()
        };

        let mut out = vec![
            record(lba, len, FLAG_DIRECTORY, &[0], &dot_su),
            record(parent_lba, parent_len, FLAG_DIRECTORY, &[1], &[]),
        ];

        for (path, entry) in self.children(dir) {
            let name = name_of(path);
            let is_dir = matches!(entry, Entry::Dir);

            let id = match h {
                Hierarchy::Primary if is_dir => name.to_uppercase().into_bytes(),
                Hierarchy::Primary => format!("{};1", name.to_uppercase()).into_bytes(),
                Hierarchy::Joliet if is_dir => utf16_be(name),
                Hierarchy::Joliet => utf16_be(&format!("{name};1")),
            };

            let su = if rock_ridge {
                let mut nm = vec![b'N', b'M', (5 + name.len()) as u8, 1, 0];
                nm.extend_from_slice(name.as_bytes());
                nm
            } else {
                Vec::new()
            };

            let (lba, len, flags) = if is_dir {
                let (lba, len) = locate(path);
                (lba, len, FLAG_DIRECTORY)
            } else {
                let (lba, content) = files[path];
                (lba, content.len() as u32, 0)
            };

            out.push(record(lba, len, flags, &id, &su));
        }

        out
    }

    /// File identifier descriptors of a UDF directory, parent first.
    fn fids(&self, dir: &str, icb: &dyn Fn(&str) -> u32) -> Vec<u8> {
        let mut out = fid(0x0A, icb(parent_of(dir)), &[]);

        for (path, entry) in self.children(dir) {
            let flags = if matches!(entry, Entry::Dir) { 0x02 } else { 0 };
            out.extend(fid(flags, icb(path), &cs0(name_of(path))));
        }

        out
    }
}

fn write_udf(
    builder: &ImageBuilder,
    data: &mut [u8],
    vds: u32,
    fsd: u32,
    entries: &HashMap<&str, (u32, u32, usize)>,
    files: &HashMap<&str, (u32, &[u8])>,
) {
    let at = |lba: u32| lba as usize * SECTOR_SIZE;

    // Anchor at sector 256 pointing to the main descriptor sequence.
    let anchor = at(256);
    tag(data, anchor, 2);
    put32(data, anchor + 16, 3 * SECTOR_SIZE as u32);
    put32(data, anchor + 20, vds);

    // Partition starting at block 0.
    tag(data, at(vds), 5);
    put32(data, at(vds) + 188, 0);

    let lvd = at(vds + 1);
    tag(data, lvd, 6);
    put32(data, lvd + 212, SECTOR_SIZE as u32);
    put32(data, lvd + 248, SECTOR_SIZE as u32);
    put32(data, lvd + 252, fsd);

    tag(data, at(vds + 2), 8);

    tag(data, at(fsd), 256);
    put32(data, at(fsd) + 400, SECTOR_SIZE as u32);
    put32(data, at(fsd) + 404, entries[""].0);

    let icb = |path: &str| entries[path].0;

    for dir in builder.dirs() {
        let (fe, lba, len) = entries[dir];
        put(data, at(lba), &builder.fids(dir, &icb));
        write_file_entry(data, at(fe), 4, lba, len as u64);
    }

    for (path, (lba, content)) in files {
        write_file_entry(data, at(entries[path].0), 5, *lba, content.len() as u64);
    }
}

fn write_file_entry(data: &mut [u8], at: usize, file_type: u8, lba: u32, len: u64) {
    tag(data, at, 261);
    data[at + 27] = file_type;
    data[at + 56..at + 64].copy_from_slice(&len.to_le_bytes());

    if len > 0 {
        put32(data, at + 172, 8);
        put32(data, at + 176, len as u32);
        put32(data, at + 180, lba);
    }
}

fn fid(characteristics: u8, icb: u32, name: &[u8]) -> Vec<u8> {
    let total = (38 + name.len()).next_multiple_of(4);
    let mut out = vec![0u8; total];

    out[0..2].copy_from_slice(&257u16.to_le_bytes());
    out[18] = characteristics;
    out[19] = name.len() as u8;
    out[20..24].copy_from_slice(&(SECTOR_SIZE as u32).to_le_bytes());
    out[24..28].copy_from_slice(&icb.to_le_bytes());
    out[38..38 + name.len()].copy_from_slice(name);
    out
}

fn cs0(name: &str) -> Vec<u8> {
    if name.chars().all(|c| (c as u32) < 0x100) {
        std::iter::once(8).chain(name.chars().map(|c| c as u8)).collect()
    } else {
        std::iter::once(16).chain(utf16_be(name)).collect()
    }
}

fn write_descriptor(
    data: &mut [u8],
    sector: usize,
    ty: u8,
    volume_id: &str,
    total: u32,
    root: (u32, u32),
    escapes: Option<&[u8; 3]>,
) {
    let at = sector * SECTOR_SIZE;
    write_marker(data, sector, ty, b"CD001");

    let mut id = [b' '; 32];
    let n = volume_id.len().min(32);
    id[..n].copy_from_slice(&volume_id.as_bytes()[..n]);
    data[at + 0x28..at + 0x48].copy_from_slice(&id);

    both32(data, at + 0x50, total);

    if let Some(escapes) = escapes {
        data[at + 0x58..at + 0x5B].copy_from_slice(escapes);
    }

    data[at + 0x80..at + 0x82].copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());
    data[at + 0x82..at + 0x84].copy_from_slice(&(SECTOR_SIZE as u16).to_be_bytes());

    let root = record(root.0, root.1, FLAG_DIRECTORY, &[0], &[]);
    put(data, at + 0x9C, &root);
}

fn write_marker(data: &mut [u8], sector: usize, ty: u8, id: &[u8; 5]) {
    let at = sector * SECTOR_SIZE;
    data[at] = ty;
    data[at + 1..at + 6].copy_from_slice(id);
    data[at + 6] = 1;
}

fn record(lba: u32, len: u32, flags: u8, id: &[u8], su: &[u8]) -> Vec<u8> {
    let su_start = 33 + id.len() + (1 - id.len() % 2);
    let total = (su_start + su.len()).next_multiple_of(2);
    let mut out = vec![0u8; total];

    out[0] = total as u8;
    both32(&mut out, 2, lba);
    both32(&mut out, 10, len);
    out[25] = flags;
    out[28..32].copy_from_slice(&[1, 0, 0, 1]);
    out[32] = id.len() as u8;
    out[33..33 + id.len()].copy_from_slice(id);
    out[su_start..su_start + su.len()].copy_from_slice(su);
    out
}

/// Concatenates records without letting any of them cross a sector.
fn layout(records: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();

    for r in records {
        let used = out.len() % SECTOR_SIZE;
        if used + r.len() > SECTOR_SIZE {
            out.resize(out.len() + SECTOR_SIZE - used, 0);
        }
        out.extend_from_slice(r);
    }

    out
}

fn tag(data: &mut [u8], at: usize, id: u16) {
    data[at..at + 2].copy_from_slice(&id.to_le_bytes());
    data[at + 2..at + 4].copy_from_slice(&2u16.to_le_bytes());
    put32(data, at + 12, (at / SECTOR_SIZE) as u32);
}

fn put(data: &mut [u8], at: usize, bytes: &[u8]) {
    data[at..at + bytes.len()].copy_from_slice(bytes);
}

fn put32(data: &mut [u8], at: usize, v: u32) {
    data[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

fn both32(data: &mut [u8], at: usize, v: u32) {
    data[at..at + 4].copy_from_slice(&v.to_le_bytes());
    data[at + 4..at + 8].copy_from_slice(&v.to_be_bytes());
}

fn utf16_be(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_be_bytes).collect()
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

fn name_of(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}
