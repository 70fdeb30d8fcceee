use flate2::Compression;
use flate2::write::ZlibEncoder;
use pretty_assertions::assert_eq;
use relic_saf::{Archive, HEADER_LEN, MAGIC};
use sha2::{Digest, Sha256};
use std::io::Write;

/// A PE image with a single section ending at 0x600.
fn executable() -> Vec<u8> {
    let mut data = vec![0u8; 0x600];
    data[0..2].copy_from_slice(b"MZ");
    data[0x3C..0x40].copy_from_slice(&0x80u32.to_le_bytes());
    data[0x80..0x84].copy_from_slice(b"PE\0\0");
    data[0x86..0x88].copy_from_slice(&1u16.to_le_bytes());
    data[0x94..0x96].copy_from_slice(&0u16.to_le_bytes());

    let table = 0x80 + 24;
    data[table..table + 6].copy_from_slice(b".text\0");
    data[table + 16..table + 20].copy_from_slice(&0x400u32.to_le_bytes());
    data[table + 20..table + 24].copy_from_slice(&0x200u32.to_le_bytes());
    data
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::best());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

#[test]
fn hello_entry() {
    let z = deflate(b"hello");
    let mut data = executable();

    data.extend_from_slice(MAGIC);
    data.extend_from_slice(&[0u8; HEADER_LEN - 3]);
    data.extend("a.txt\0".encode_utf16().flat_map(u16::to_le_bytes));
    data.extend_from_slice(&(z.len() as i32).to_le_bytes());
    data.extend_from_slice(&z);
    data.extend_from_slice(b"\x01\x02\x03\x04\x05\x06\x07\x08");

    let archive = Archive::new(data).unwrap();
    let entry = archive.entry("/a.txt").unwrap();

    assert_eq!(archive.exe_eof(), 0x600);
    assert_eq!(entry.name(), "a.txt");
    assert_eq!(entry.len(), 5);
    assert_eq!(entry.compressed_len(), z.len() as u64);
    assert_eq!(entry.offset(), 0x600 + 48 + 12 + 4);
    assert_eq!(entry.digest().as_slice(), Sha256::digest(b"hello").as_slice());
    assert_eq!(entry.meta(), b"\x01\x02\x03\x04\x05\x06\x07\x08");
    assert_eq!(archive.entry_data(entry).unwrap(), b"hello");
    assert!(archive.entry("/b.txt").is_none());
}

#[test]
fn unicode_names_and_duplicates() {
    let mut data = executable();

    data.extend_from_slice(MAGIC);
    data.extend_from_slice(&[0u8; HEADER_LEN - 3]);

    for (name, body) in [("ñandú.swf", b"one".as_slice()), ("x", b"old"), ("x", b"new")] {
        let z = deflate(body);
        data.extend(name.encode_utf16().chain([0]).flat_map(u16::to_le_bytes));
        data.extend_from_slice(&(z.len() as i32).to_le_bytes());
        data.extend_from_slice(&z);
        data.extend_from_slice(&[0u8; 8]);
    }

    let archive = Archive::new(data).unwrap();
    let mut paths: Vec<_> = archive.paths().collect();
    paths.sort();

    assert_eq!(paths, vec!["/x", "/ñandú.swf"]);
    assert_eq!(archive.entries().len(), 3);

    let x = archive.entry("/x").unwrap();
    assert_eq!(archive.entry_data(x).unwrap(), b"new");
}

#[test]
fn plain_executable_is_rejected() {
    assert!(matches!(
        Archive::new(executable()),
        Err(relic_saf::OpenError::InvalidFormat { exe_eof: 0x600 })
    ));
}
