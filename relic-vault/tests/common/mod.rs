#![allow(dead_code, clippy::unwrap_used)]

use flate2::Compression;
use flate2::write::ZlibEncoder;
use relic_iso::builder::ImageBuilder;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes a mount directory holding `image` and, if given, a defect map.
pub fn disc_dir(root: &Path, name: &str, image: ImageBuilder, mapfile: Option<&str>) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("cdimage"), image.build()).unwrap();

    if let Some(text) = mapfile {
        std::fs::write(dir.join("mapfile"), text).unwrap();
    }

    dir
}

/// Writes a PE executable ending at 0x600 followed by a SAF trailer holding
/// `entries`.
pub fn archive_exe(path: &Path, entries: &[(&str, &[u8])]) {
    let mut data = vec![0u8; 0x600];
    data[0..2].copy_from_slice(b"MZ");
    data[0x3C..0x40].copy_from_slice(&0x80u32.to_le_bytes());
    data[0x80..0x84].copy_from_slice(b"PE\0\0");
    data[0x86..0x88].copy_from_slice(&1u16.to_le_bytes());

    let table = 0x80 + 24;
    data[table..table + 6].copy_from_slice(b".text\0");
    data[table + 16..table + 20].copy_from_slice(&0x400u32.to_le_bytes());
    data[table + 20..table + 24].copy_from_slice(&0x200u32.to_le_bytes());

    data.extend_from_slice(relic_saf::MAGIC);
    data.extend_from_slice(&[0u8; relic_saf::HEADER_LEN - 3]);

    for (name, body) in entries {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(body).unwrap();
        let z = enc.finish().unwrap();

        data.extend(name.encode_utf16().chain([0]).flat_map(u16::to_le_bytes));
        data.extend_from_slice(&(z.len() as i32).to_le_bytes());
        data.extend_from_slice(&z);
        data.extend_from_slice(&[0u8; 8]);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }

    std::fs::write(path, data).unwrap();
}

/// Concatenates every chunk of a stream.
pub fn read_all(container: &dyn relic_vault::Container, path: &str) -> Vec<u8> {
    container.stream(path).unwrap().flat_map(|c| c.into_owned()).collect()
}
